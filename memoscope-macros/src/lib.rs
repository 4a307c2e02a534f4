use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::{format_ident, quote};
use syn::{parse_macro_input, FnArg, ItemFn, ReturnType, Type};

use memoscope_macro_utils::{
    argument_ident, classify_receiver, generate_key_expr, parse_memoize_attributes,
    result_ok_type, MemoKind, ReceiverKind,
};

/// Generate the body for functions and methods: the cache stores the
/// return type (or its `Ok` type) directly.
fn generate_direct_branch(
    cache_ident: &syn::Ident,
    ret_type: &Type,
    stored_type: &TokenStream2,
    site_expr: &TokenStream2,
    key_expr: &TokenStream2,
    block: &syn::Block,
    cache_name: &str,
    is_result: bool,
) -> TokenStream2 {
    let invoke_call = if is_result {
        quote! { #cache_ident.try_invoke(#site_expr, &__key, || -> #ret_type #block) }
    } else {
        quote! { #cache_ident.invoke(#site_expr, &__key, || -> #ret_type #block) }
    };

    quote! {
        static #cache_ident: ::memoscope_core::__private::Lazy<::memoscope_core::ScopedCache<#stored_type>> =
            ::memoscope_core::__private::Lazy::new(|| ::memoscope_core::ScopedCache::registered(#cache_name));

        let __key = #key_expr;
        #invoke_call
    }
}

/// Generate the body for constructors.
///
/// The stored value is type-erased so the static never names `Self`; the
/// scope is the constructed type.
fn generate_constructor_branch(
    cache_ident: &syn::Ident,
    ret_type: &Type,
    stored_type: &TokenStream2,
    key_expr: &TokenStream2,
    block: &syn::Block,
    cache_name: &str,
    is_result: bool,
) -> TokenStream2 {
    let erased = quote! { ::std::sync::Arc<dyn ::std::any::Any + Send + Sync> };
    let site_expr = quote! { ::memoscope_core::CallSite::constructor::<#stored_type>() };

    let downcast = quote! {
        match __erased.downcast_ref::<#stored_type>() {
            Some(value) => ::std::clone::Clone::clone(value),
            None => unreachable!("memoized constructor `{}` stored a foreign type", #cache_name),
        }
    };

    let invoke_call = if is_result {
        quote! {
            let __erased = #cache_ident.try_invoke(#site_expr, &__key, || {
                (|| -> #ret_type #block)().map(|value| ::std::sync::Arc::new(value) as #erased)
            })?;
            #downcast
        }
    } else {
        quote! {
            let __erased = #cache_ident.invoke(#site_expr, &__key, || {
                ::std::sync::Arc::new((|| -> #ret_type #block)()) as #erased
            });
            #downcast
        }
    };

    // Result constructors need the `Ok` wrapping back
    let tail = if is_result {
        quote! { Ok({ #invoke_call }) }
    } else {
        quote! { #invoke_call }
    };

    quote! {
        static #cache_ident: ::memoscope_core::__private::Lazy<::memoscope_core::ScopedCache<#erased>> =
            ::memoscope_core::__private::Lazy::new(|| ::memoscope_core::ScopedCache::registered(#cache_name));

        let __key = #key_expr;
        #tail
    }
}

/// A procedural macro that memoizes functions, methods and constructors,
/// scoping every cached result to the value the call was made on.
///
/// Results are cached per receiver first and per argument list second.
/// Dropping the receiver makes all of its results unreachable; the cache
/// holds no strong reference to receivers or to shared (`Arc`) arguments.
///
/// # Requirements
///
/// - **Arguments**: Must implement `memoscope_core::KeyToken`
/// - **Return type**: Must implement `Clone + Send + Sync + 'static`, and
///   must not mention `Self` or generic parameters (it is stored in a
///   `static`). Constructors are the exception: they may return `Self`.
/// - **Methods**: `Self` must implement `memoscope_core::Receiver`,
///   usually by embedding an `Anchor` (see `delegate_receiver!`). Take
///   `&self` or `self: Arc<Self>`; `&mut self` and `self: &mut Self` are
///   rejected.
/// - **Argument patterns**: Every argument is part of the key, so each must
///   be bound to a plain name. `_` and destructuring patterns are rejected.
/// - **Dependencies**: The generated code refers to `::memoscope_core`, so
///   the calling crate must depend on `memoscope-core` directly.
///
/// # Macro Parameters
///
/// - `kind` (optional): Call-site shape. Options:
///   - `"function"` - one shared scope for every call (default without `self`)
///   - `"method"` - one scope per receiver (default with `self`)
///   - `"constructor"` - one scope for the constructed type; equal
///     arguments return the same instance
/// - `name` (optional): Identifier of the cache in the statistics registry
///   and in log events. Default: the function name.
///
/// # Cache Behavior
///
/// - **Result-returning functions**: Only `Ok` values are cached, `Err`
///   values are returned unchanged and the next call recomputes
/// - **Concurrency**: Concurrent callers with the same key wait for a single
///   computation
/// - **Recursion**: Recursing into the same function with different
///   arguments is fine; recursing with the *same* arguments deadlocks
///
/// # Examples
///
/// ## Free Function
///
/// ```ignore
/// use memoscope::memoize;
///
/// #[memoize]
/// fn fibonacci(n: u64) -> u64 {
///     if n < 2 {
///         return n;
///     }
///     fibonacci(n - 1) + fibonacci(n - 2)
/// }
/// ```
///
/// ## Method
///
/// ```ignore
/// use memoscope::{delegate_receiver, memoize, Anchor};
///
/// struct Catalog {
///     anchor: Anchor,
///     prices: Vec<u32>,
/// }
///
/// delegate_receiver!(Catalog => anchor);
///
/// impl Catalog {
///     #[memoize]
///     fn total(&self, discount: u32) -> u32 {
///         self.prices.iter().map(|p| p.saturating_sub(discount)).sum()
///     }
/// }
/// ```
///
/// ## Constructor
///
/// ```ignore
/// use memoscope::memoize;
/// use std::sync::Arc;
///
/// struct Color(u8, u8, u8);
///
/// impl Color {
///     #[memoize(kind = "constructor")]
///     fn rgb(r: u8, g: u8, b: u8) -> Arc<Color> {
///         Arc::new(Color(r, g, b))
///     }
/// }
///
/// assert!(Arc::ptr_eq(&Color::rgb(1, 2, 3), &Color::rgb(1, 2, 3)));
/// ```
///
/// ## Result Type Caching (Errors NOT Cached)
///
/// ```ignore
/// use memoscope::memoize;
///
/// #[memoize(name = "parse_port")]
/// fn parse_port(text: &str) -> Result<u16, String> {
///     text.parse().map_err(|_| format!("not a port: {}", text))
/// }
/// ```
#[proc_macro_attribute]
pub fn memoize(attr: TokenStream, item: TokenStream) -> TokenStream {
    let attrs = match parse_memoize_attributes(attr.into()) {
        Ok(attrs) => attrs,
        Err(err) => return TokenStream::from(err),
    };

    let input = parse_macro_input!(item as ItemFn);
    let fn_attrs = &input.attrs;
    let vis = &input.vis;
    let sig = &input.sig;
    let ident = &sig.ident;
    let block = &input.block;

    if sig.asyncness.is_some() {
        return TokenStream::from(quote! {
            compile_error!("#[memoize] does not support async functions");
        });
    }

    // Parse arguments and detect self
    let mut arg_pats = Vec::new();
    let mut self_arg: Option<ReceiverKind> = None;
    for arg in sig.inputs.iter() {
        match arg {
            FnArg::Receiver(receiver) => match classify_receiver(receiver) {
                Ok(receiver_kind) => self_arg = Some(receiver_kind),
                Err(err) => return TokenStream::from(err),
            },
            FnArg::Typed(pat_type) => match argument_ident(pat_type) {
                Ok(name) => arg_pats.push(quote! { #name }),
                Err(err) => return TokenStream::from(err),
            },
        }
    }

    let kind = match attrs.resolve_kind(self_arg.is_some()) {
        Ok(kind) => kind,
        Err(err) => return TokenStream::from(err),
    };

    let ret_type: Type = match &sig.output {
        ReturnType::Type(_, ty) => (**ty).clone(),
        ReturnType::Default => syn::parse_quote! { () },
    };
    let ok_type = result_ok_type(&sig.output);
    let is_result = ok_type.is_some();
    let stored_type = match &ok_type {
        Some(ok) => quote! { #ok },
        None => quote! { #ret_type },
    };

    let cache_ident = format_ident!("MEMOSCOPE_CACHE_{}", ident.to_string().to_uppercase());
    let cache_name = attrs.custom_name.unwrap_or_else(|| ident.to_string());
    let key_expr = generate_key_expr(&arg_pats);

    let body = match kind {
        MemoKind::Function => generate_direct_branch(
            &cache_ident,
            &ret_type,
            &stored_type,
            &quote! { ::memoscope_core::CallSite::Function },
            &key_expr,
            block,
            &cache_name,
            is_result,
        ),
        MemoKind::Method => {
            let site_expr = match self_arg {
                Some(ReceiverKind::Owned) => quote! { ::memoscope_core::CallSite::Method(&self) },
                _ => quote! { ::memoscope_core::CallSite::Method(self) },
            };
            generate_direct_branch(
                &cache_ident,
                &ret_type,
                &stored_type,
                &site_expr,
                &key_expr,
                block,
                &cache_name,
                is_result,
            )
        }
        MemoKind::Constructor => generate_constructor_branch(
            &cache_ident,
            &ret_type,
            &stored_type,
            &key_expr,
            block,
            &cache_name,
            is_result,
        ),
    };

    let expanded = quote! {
        #(#fn_attrs)*
        #vis #sig {
            #body
        }
    };

    TokenStream::from(expanded)
}
