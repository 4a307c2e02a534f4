//! Shared utilities for memoscope procedural macros
//!
//! Attribute parsing and the small pieces of code generation that do not
//! depend on `proc_macro` itself, so they can be unit tested.

use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{
    punctuated::Punctuated, Expr, GenericArgument, Ident, MetaNameValue, Pat, PatType,
    PathArguments, Receiver, ReturnType, Token, Type,
};

/// Call-site shape requested through `kind = "..."`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MemoKind {
    Function,
    Method,
    Constructor,
}

/// Parsed `#[memoize(...)]` attributes
#[derive(Debug, Default)]
pub struct MemoizeAttributes {
    /// Explicit shape; `None` means infer from the signature.
    pub kind: Option<MemoKind>,
    pub custom_name: Option<String>,
}

impl MemoizeAttributes {
    /// Resolves the call-site shape, inferring `Method` when the function
    /// has a `self` receiver.
    pub fn resolve_kind(&self, has_self: bool) -> Result<MemoKind, TokenStream2> {
        match (self.kind, has_self) {
            (None, true) => Ok(MemoKind::Method),
            (None, false) => Ok(MemoKind::Function),
            (Some(MemoKind::Method), false) => Err(
                quote! { compile_error!("`kind = \"method\"` requires a `self` receiver") },
            ),
            (Some(MemoKind::Constructor), true) => Err(
                quote! { compile_error!("`kind = \"constructor\"` cannot take a `self` receiver") },
            ),
            (Some(kind), _) => Ok(kind),
        }
    }
}

/// How a memoized method takes `self`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReceiverKind {
    /// `&self` or `self: &Self`
    Shared,
    /// `self`, `self: Arc<Self>` and other owned receivers
    Owned,
}

/// Classify a `self` receiver by its type, so the shorthand and the typed
/// spelling (`&mut self`, `self: &mut Self`) are treated alike.
pub fn classify_receiver(receiver: &Receiver) -> Result<ReceiverKind, TokenStream2> {
    match receiver.ty.as_ref() {
        Type::Reference(reference) if reference.mutability.is_some() => Err(quote! {
            compile_error!("#[memoize] methods must take `&self` or `self: Arc<Self>`, not `&mut self`");
        }),
        Type::Reference(_) => Ok(ReceiverKind::Shared),
        _ => Ok(ReceiverKind::Owned),
    }
}

/// Return the name an argument is bound to.
///
/// Every argument becomes part of the cache key, so it must be reachable by
/// name: `_` and destructuring patterns are rejected.
pub fn argument_ident(arg: &PatType) -> Result<&Ident, TokenStream2> {
    match arg.pat.as_ref() {
        Pat::Ident(pat_ident) if pat_ident.subpat.is_none() => Ok(&pat_ident.ident),
        _ => Err(quote! {
            compile_error!("#[memoize] arguments must be bound to a plain name, not `_` or a destructuring pattern");
        }),
    }
}

/// Parse the `kind` attribute
pub fn parse_kind_attribute(nv: &MetaNameValue) -> Result<MemoKind, TokenStream2> {
    match &nv.value {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            syn::Lit::Str(s) => match s.value().as_str() {
                "function" => Ok(MemoKind::Function),
                "method" => Ok(MemoKind::Method),
                "constructor" => Ok(MemoKind::Constructor),
                _ => Err(
                    quote! { compile_error!("Invalid kind: expected \"function\", \"method\", or \"constructor\"") },
                ),
            },
            _ => Err(quote! { compile_error!("Invalid literal for `kind`: expected string") }),
        },
        _ => Err(
            quote! { compile_error!("Invalid syntax for `kind`: expected `kind = \"function\"|\"method\"|\"constructor\"`") },
        ),
    }
}

/// Parse the `name` attribute
pub fn parse_name_attribute(nv: &MetaNameValue) -> Result<String, TokenStream2> {
    match &nv.value {
        Expr::Lit(expr_lit) => match &expr_lit.lit {
            syn::Lit::Str(s) if !s.value().is_empty() => Ok(s.value()),
            syn::Lit::Str(_) => Err(quote! { compile_error!("`name` must not be empty") }),
            _ => Err(quote! { compile_error!("Invalid literal for `name`: expected string") }),
        },
        _ => Err(quote! { compile_error!("Invalid syntax for `name`: expected `name = \"...\"`") }),
    }
}

/// Parse `#[memoize(...)]` attributes from a token stream
pub fn parse_memoize_attributes(attr: TokenStream2) -> Result<MemoizeAttributes, TokenStream2> {
    use syn::parse::Parser;

    let parser = Punctuated::<MetaNameValue, Token![,]>::parse_terminated;
    let parsed_args = parser.parse2(attr).map_err(|e| {
        let msg = format!("Failed to parse attributes: {}", e);
        quote! { compile_error!(#msg) }
    })?;

    let mut attrs = MemoizeAttributes::default();

    for nv in parsed_args {
        if nv.path.is_ident("kind") {
            attrs.kind = Some(parse_kind_attribute(&nv)?);
        } else if nv.path.is_ident("name") {
            attrs.custom_name = Some(parse_name_attribute(&nv)?);
        } else {
            let msg = match nv.path.get_ident() {
                Some(ident) => format!("Unknown memoize attribute `{}`: expected `kind` or `name`", ident),
                None => "Unknown memoize attribute: expected `kind` or `name`".to_string(),
            };
            return Err(quote! { compile_error!(#msg) });
        }
    }

    Ok(attrs)
}

/// Generate the composite key expression for the given argument patterns
pub fn generate_key_expr(arg_pats: &[TokenStream2]) -> TokenStream2 {
    if arg_pats.is_empty() {
        quote! { ::memoscope_core::CompositeKey::empty() }
    } else {
        quote! {
            ::memoscope_core::ArgumentList::composite_key(&( #( &#arg_pats, )* ))
        }
    }
}

/// If `output` is `Result<T, E>`, returns `T`.
///
/// Matches on the last path segment, so `std::result::Result<T, E>` and
/// `Result<T, E>` are both recognized. Aliases with a single parameter
/// (like `io::Result<T>`) are not.
pub fn result_ok_type(output: &ReturnType) -> Option<Type> {
    let ReturnType::Type(_, ty) = output else {
        return None;
    };
    let Type::Path(type_path) = ty.as_ref() else {
        return None;
    };
    let segment = type_path.path.segments.last()?;
    if segment.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    if args.args.len() != 2 {
        return None;
    }
    match args.args.first()? {
        GenericArgument::Type(ok) => Some(ok.clone()),
        _ => None,
    }
}
