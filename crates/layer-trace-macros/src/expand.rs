//! Rewriting of an `impl` block under `#[trace]`
//!
//! Each eligible method is split in two. The original body moves, with its
//! signature unchanged, into a hidden `__layer_trace_<name>_<hash>` method. The
//! visible method keeps its name and signature (argument patterns become plain
//! bindings) and forwards to the hidden one between `Tracer::enter` and
//! `CallGuard::settle`, so an early `return` or `?` in the body still reaches
//! the post-call step. Hidden methods of a trait impl go into a separate
//! inherent impl of the same self type.
//!
//! The guard is created from a per-block static tracer emitted next to the
//! block.

use crate::options::TraceOptions;
use proc_macro2::{TokenStream, TokenTree};
use quote::{format_ident, quote};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use syn::ext::IdentExt;
use syn::{
    parse_quote, Attribute, Error, FnArg, Ident, ImplItem, ImplItemFn, Item, ItemImpl, LitStr, Pat,
    PatIdent, Result, ReturnType, Type, TypePath, Visibility,
};

/// Prefix of the hidden methods holding the original bodies
const HIDDEN_PREFIX: &str = "__layer_trace_";

/// Expand `#[trace(attr)]` applied to `item`
pub fn expand(attr: TokenStream, item: TokenStream) -> Result<TokenStream> {
    let options = TraceOptions::parse(attr)?;
    let fingerprint = fingerprint(&item);

    let mut item_impl = match syn::parse2::<Item>(item)? {
        Item::Impl(item_impl) => item_impl,
        other => {
            return Err(Error::new_spanned(
                other,
                "#[trace] can only be applied to an impl block",
            ))
        }
    };

    let class = class_ident(&item_impl.self_ty)?.unraw();
    let tracer = format_ident!(
        "__LAYER_TRACE_{}_{:016X}",
        class.to_string().to_uppercase(),
        fingerprint
    );

    let mut hidden = Vec::new();
    for impl_item in &mut item_impl.items {
        let ImplItem::Fn(method) = impl_item else {
            continue;
        };
        if is_eligible(method, &options) {
            hidden.push(instrument(method, &tracer, fingerprint));
        }
    }

    if hidden.is_empty() {
        return Ok(quote!(#item_impl));
    }

    let tracer_static = tracer_static(&tracer, &class, &options, &item_impl);
    let hidden_impl = if item_impl.trait_.is_some() {
        let (impl_generics, _, where_clause) = item_impl.generics.split_for_impl();
        let self_ty = &item_impl.self_ty;
        quote! {
            impl #impl_generics #self_ty #where_clause {
                #(#hidden)*
            }
        }
    } else {
        item_impl.items.extend(hidden.into_iter().map(ImplItem::Fn));
        TokenStream::new()
    };

    Ok(quote! {
        #tracer_static
        #item_impl
        #hidden_impl
    })
}

fn fingerprint(item: &TokenStream) -> u64 {
    let mut hasher = DefaultHasher::new();
    item.to_string().hash(&mut hasher);
    hasher.finish()
}

fn class_ident(self_ty: &Type) -> Result<&Ident> {
    match self_ty {
        Type::Path(TypePath { qself: None, path }) => path
            .segments
            .last()
            .map(|segment| &segment.ident)
            .ok_or_else(|| Error::new_spanned(path, "#[trace] requires a named self type")),
        Type::Group(group) => class_ident(&group.elem),
        Type::Paren(paren) => class_ident(&paren.elem),
        other => Err(Error::new_spanned(
            other,
            "#[trace] requires a named self type",
        )),
    }
}

/// Methods with a receiver that are neither disabled, `const`, nor a hidden
/// body left by an earlier `#[trace]`
fn is_eligible(method: &ImplItemFn, options: &TraceOptions) -> bool {
    let name = method.sig.ident.unraw().to_string();
    method.sig.receiver().is_some()
        && method.sig.constness.is_none()
        && !name.starts_with(HIDDEN_PREFIX)
        && !options.is_disabled(&name)
}

/// Turn `method` into the instrumented forwarder and return the hidden method
/// that now holds its original body.
fn instrument(method: &mut ImplItemFn, tracer: &Ident, fingerprint: u64) -> ImplItemFn {
    let method_name = method.sig.ident.unraw().to_string();
    let name = LitStr::new(&method_name, method.sig.ident.span());

    let mut original = method.clone();
    original.sig.ident = format_ident!("{}{}_{:016x}", HIDDEN_PREFIX, method_name, fingerprint);
    original.vis = Visibility::Inherited;
    original.defaultness = None;
    original.attrs.retain(is_carried_to_hidden);
    original.attrs.push(parse_quote!(#[doc(hidden)]));
    let hidden_ident = &original.sig.ident;

    let mut forwarded = Vec::new();
    let mut captures = Vec::new();
    for (index, input) in method.sig.inputs.iter_mut().enumerate() {
        match input {
            FnArg::Receiver(receiver) => {
                if receiver.reference.is_none() {
                    receiver.mutability = None;
                }
                forwarded.push(quote!(self));
            }
            FnArg::Typed(pat_type) => {
                let binding = match &*pat_type.pat {
                    Pat::Ident(PatIdent {
                        by_ref: None,
                        subpat: None,
                        ident,
                        ..
                    }) => ident.clone(),
                    _ => format_ident!("__layer_trace_arg{}", index),
                };
                *pat_type.pat = parse_quote!(#binding);
                forwarded.push(quote!(#binding));
                captures.push(binding);
            }
        }
    }

    // For `async fn` this runs at the first poll of the returned future, so
    // the argument record of a future that is never polled is never emitted.
    let call = match method.sig.asyncness {
        Some(_) => quote!(Self::#hidden_ident(#(#forwarded),*).await),
        None => quote!(Self::#hidden_ident(#(#forwarded),*)),
    };
    let annotation = result_annotation(&method.sig.output);

    method.block = parse_quote!({
        let __layer_trace_guard = #tracer.enter(#name, || {
            ::std::vec![#(::layer_trace::capture_arg!(#captures)),*]
        });
        let __layer_trace_result #annotation = #call;
        __layer_trace_guard.settle(::layer_trace::is_failure!(__layer_trace_result));
        __layer_trace_result
    });

    original
}

/// Lint and `cfg` attributes apply to the hidden body too; everything else
/// (docs, other attribute macros) stays on the visible method only.
fn is_carried_to_hidden(attr: &Attribute) -> bool {
    ["cfg", "allow", "expect", "warn", "deny", "forbid"]
        .iter()
        .any(|name| attr.path().is_ident(name))
}

/// `: <return type>` so the result is typed before it is classified.
/// Omitted for `()` and for types that mention `impl Trait`.
fn result_annotation(output: &ReturnType) -> Option<TokenStream> {
    match output {
        ReturnType::Default => None,
        ReturnType::Type(_, ty) if mentions_impl(quote!(#ty)) => None,
        ReturnType::Type(_, ty) => Some(quote!(: #ty)),
    }
}

fn mentions_impl(tokens: TokenStream) -> bool {
    tokens.into_iter().any(|token| match token {
        TokenTree::Ident(ident) => ident == "impl",
        TokenTree::Group(group) => mentions_impl(group.stream()),
        _ => false,
    })
}

fn tracer_static(
    tracer: &Ident,
    class: &Ident,
    options: &TraceOptions,
    item_impl: &ItemImpl,
) -> TokenStream {
    let class_name = LitStr::new(&class.to_string(), class.span());
    let disable = &options.disable;
    let perf = options.perf;
    let mem_watch = options.mem_watch;
    let log_input = options.log_input;
    let beautify = options.beautify;
    let sink = options.sink.as_ref().map(|path| quote!(.with_sink(#path())));
    let self_ty = &item_impl.self_ty;
    let doc = format!("Tracer for `{}`", quote!(#self_ty));

    quote! {
        #[doc = #doc]
        #[doc(hidden)]
        static #tracer: ::layer_trace::__private::Lazy<::layer_trace::Tracer> =
            ::layer_trace::__private::Lazy::new(|| {
                let config = ::layer_trace::TraceConfig::new()
                    #(.disable(#disable))*
                    .with_measure_time(#perf)
                    .with_measure_memory(#mem_watch)
                    .with_input_logging(#log_input, #beautify);
                ::layer_trace::Tracer::builder(#class_name, config)
                    #sink
                    .build()
            });
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use syn::{File, ItemStatic};

    fn expand_file(attr: TokenStream, item: TokenStream) -> File {
        syn::parse2(expand(attr, item).unwrap()).unwrap()
    }

    fn impl_of(file: &File) -> &ItemImpl {
        file.items
            .iter()
            .find_map(|item| match item {
                Item::Impl(item_impl) => Some(item_impl),
                _ => None,
            })
            .unwrap()
    }

    fn statics(file: &File) -> Vec<&ItemStatic> {
        file.items
            .iter()
            .filter_map(|item| match item {
                Item::Static(item_static) => Some(item_static),
                _ => None,
            })
            .collect()
    }

    fn body(file: &File, name: &str) -> String {
        impl_of(file)
            .items
            .iter()
            .find_map(|item| match item {
                ImplItem::Fn(method) if method.sig.ident == name => {
                    let block = &method.block;
                    Some(quote!(#block).to_string())
                }
                _ => None,
            })
            .unwrap()
    }

    fn signature(file: &File, prefix: &str) -> String {
        impl_of(file)
            .items
            .iter()
            .find_map(|item| match item {
                ImplItem::Fn(method) if method.sig.ident.to_string().starts_with(prefix) => {
                    let sig = &method.sig;
                    Some(quote!(#sig).to_string())
                }
                _ => None,
            })
            .unwrap()
    }

    fn order_service() -> TokenStream {
        quote! {
            impl OrderService {
                const LIMIT: usize = 3;

                fn new() -> Self {
                    OrderService
                }

                fn place(&self, id: &str) -> String {
                    id.to_string()
                }

                fn health(&self) -> bool {
                    true
                }

                async fn fetch(&self, id: u32) -> u32 {
                    id
                }
            }
        }
    }

    #[test]
    fn test_methods_with_receiver_are_instrumented() {
        let file = expand_file(quote!(perf), order_service());

        assert_eq!(statics(&file).len(), 1);
        let tracer = statics(&file)[0].ident.to_string();
        assert!(tracer.starts_with("__LAYER_TRACE_ORDERSERVICE_"));

        let place = body(&file, "place");
        assert!(place.contains(&tracer));
        assert!(place.contains("\"place\""));
        assert!(place.contains("capture_arg"));
        assert!(place.contains("let __layer_trace_result : String = Self :: __layer_trace_place_"));
        assert!(place.contains("settle (:: layer_trace :: is_failure ! (__layer_trace_result))"));

        let fetch = body(&file, "fetch");
        assert!(fetch.contains("\"fetch\""));
        assert!(fetch.contains("(self , id) . await"));
    }

    #[test]
    fn test_original_body_moves_to_hidden_method() {
        let file = expand_file(
            TokenStream::new(),
            quote! {
                impl LedgerRepo {
                    /// Parse one entry
                    #[allow(clippy::needless_question_mark)]
                    pub fn parse(&self, raw: &str) -> Result<u32, ParseIntError> {
                        if raw.is_empty() {
                            return Ok(0);
                        }
                        Ok(raw.parse::<u32>()?)
                    }
                }
            },
        );

        let hidden = impl_of(&file)
            .items
            .iter()
            .find_map(|item| match item {
                ImplItem::Fn(method) if method.sig.ident.to_string().starts_with("__layer_trace_parse_") => {
                    Some(method)
                }
                _ => None,
            })
            .unwrap();
        assert!(matches!(hidden.vis, Visibility::Inherited));
        assert!(hidden.attrs.iter().any(|a| a.path().is_ident("allow")));
        assert!(!hidden.attrs.iter().any(|a| quote!(#a).to_string().contains("Parse one entry")));

        let block = &hidden.block;
        let original = quote!(#block).to_string();
        assert!(original.contains("return Ok (0)"));
        assert!(!original.contains("__layer_trace_guard"));

        let parse = body(&file, "parse");
        assert!(!parse.contains("return"));
        assert!(parse.contains("Result < u32 , ParseIntError >"));
    }

    #[test]
    fn test_constructor_and_consts_untouched() {
        let file = expand_file(TokenStream::new(), order_service());

        assert!(!body(&file, "new").contains("__layer_trace_guard"));
        let has_const = impl_of(&file)
            .items
            .iter()
            .any(|item| matches!(item, ImplItem::Const(c) if c.ident == "LIMIT"));
        assert!(has_const);
    }

    #[test]
    fn test_disabled_method_untouched() {
        let file = expand_file(quote!(disable = ["health"]), order_service());
        assert!(!body(&file, "health").contains("__layer_trace_guard"));
        assert!(body(&file, "place").contains("__layer_trace_guard"));
    }

    #[test]
    fn test_static_carries_configuration() {
        let file = expand_file(
            quote!(disable = ["health"], mem_watch, log_input(beautify = true), sink = sinks::shared),
            order_service(),
        );
        let tracer = statics(&file)[0];
        let init = quote!(#tracer).to_string();

        assert!(init.contains("\"OrderService\""));
        assert!(init.contains("disable (\"health\")"));
        assert!(init.contains("with_measure_time (false)"));
        assert!(init.contains("with_measure_memory (true)"));
        assert!(init.contains("with_input_logging (true , true)"));
        assert!(init.contains("with_sink (sinks :: shared ())"));
    }

    #[test]
    fn test_destructured_arguments_are_rebound() {
        let file = expand_file(
            TokenStream::new(),
            quote! {
                impl Grid {
                    fn at(&self, (x, y): (u32, u32), _: bool) -> u32 {
                        x + y
                    }
                }
            },
        );

        let method = impl_of(&file)
            .items
            .iter()
            .find_map(|item| match item {
                ImplItem::Fn(method) => Some(method),
                _ => None,
            })
            .unwrap();
        let wrapper_sig = {
            let sig = &method.sig;
            quote!(#sig).to_string()
        };
        assert!(wrapper_sig.contains("__layer_trace_arg1"));
        assert!(wrapper_sig.contains("__layer_trace_arg2"));

        assert!(body(&file, "at").contains("(self , __layer_trace_arg1 , __layer_trace_arg2)"));
        let original = signature(&file, "__layer_trace_at_");
        assert!(original.contains("(x , y) : (u32 , u32)"));
        assert!(original.contains("_ : bool"));
    }

    #[test]
    fn test_mut_bindings_stay_on_hidden_method() {
        let file = expand_file(
            TokenStream::new(),
            quote! {
                impl Tally {
                    fn add(&mut self, mut amount: u32) -> u32 {
                        amount += 1;
                        amount
                    }

                    fn into_total(mut self, bonus: u32) -> u32 {
                        self.total += bonus;
                        self.total
                    }
                }
            },
        );

        assert_eq!(signature(&file, "add"), "fn add (& mut self , amount : u32) -> u32");
        assert_eq!(
            signature(&file, "into_total"),
            "fn into_total (self , bonus : u32) -> u32"
        );
        assert!(signature(&file, "__layer_trace_add_").contains("mut amount : u32"));
        assert!(signature(&file, "__layer_trace_into_total_").contains("mut self"));
    }

    #[test]
    fn test_impl_trait_return_is_not_annotated() {
        let file = expand_file(
            TokenStream::new(),
            quote! {
                impl Catalog {
                    fn ids(&self) -> impl Iterator<Item = u32> + '_ {
                        self.ids.iter().copied()
                    }

                    fn touch(&self) {}
                }
            },
        );

        assert!(body(&file, "ids").contains("let __layer_trace_result = Self ::"));
        assert!(body(&file, "touch").contains("let __layer_trace_result = Self ::"));
    }

    #[test]
    fn test_trait_impl_gets_separate_inherent_impl() {
        let file = expand_file(
            TokenStream::new(),
            quote! {
                impl<T: Display> fmt::Display for Wrapper<T> {
                    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                        write!(f, "{}", self.0)
                    }
                }
            },
        );

        let impls: Vec<&ItemImpl> = file
            .items
            .iter()
            .filter_map(|item| match item {
                Item::Impl(item_impl) => Some(item_impl),
                _ => None,
            })
            .collect();
        assert_eq!(impls.len(), 2);
        assert!(impls[0].trait_.is_some());
        assert_eq!(impls[0].items.len(), 1);
        assert!(impls[1].trait_.is_none());

        let inherent = impls[1];
        let header = {
            let generics = &inherent.generics;
            let self_ty = &inherent.self_ty;
            quote!(impl #generics #self_ty).to_string()
        };
        assert_eq!(header, "impl < T : Display > Wrapper < T >");
        assert!(matches!(
            &inherent.items[0],
            ImplItem::Fn(method) if method.sig.ident.to_string().starts_with("__layer_trace_fmt_")
        ));
    }

    #[test]
    fn test_class_name_from_generic_path() {
        let file = expand_file(
            TokenStream::new(),
            quote! {
                impl<T: Clone> crate::repo::UserRepo<T> {
                    fn get(&self, key: T) -> T {
                        key
                    }
                }
            },
        );
        let tracer = statics(&file)[0];
        assert!(tracer.ident.to_string().starts_with("__LAYER_TRACE_USERREPO_"));
        assert!(quote!(#tracer).to_string().contains("\"UserRepo\""));
    }

    #[test]
    fn test_no_eligible_methods_emits_no_static() {
        let file = expand_file(
            TokenStream::new(),
            quote! {
                impl Factory {
                    fn build() -> Self {
                        Factory
                    }
                }
            },
        );
        assert!(statics(&file).is_empty());
    }

    #[test]
    fn test_non_impl_item_rejected() {
        let err = expand(TokenStream::new(), quote!(fn free() {})).unwrap_err();
        assert!(err.to_string().contains("impl block"));
    }

    #[test]
    fn test_stacked_attributes_get_distinct_statics() {
        let first = expand_file(quote!(perf), order_service());
        let rewritten = impl_of(&first);
        let second = expand_file(quote!(mem_watch), quote!(#rewritten));

        assert_ne!(statics(&first)[0].ident, statics(&second)[0].ident);

        let stacked = impl_of(&second);
        let text = quote!(#stacked).to_string();
        assert_eq!(text.matches("let __layer_trace_guard").count(), 6);
        let hidden_places = stacked
            .items
            .iter()
            .filter(|item| {
                matches!(item, ImplItem::Fn(m) if m.sig.ident.to_string().starts_with("__layer_trace_place_"))
            })
            .count();
        assert_eq!(hidden_places, 2);
    }
}
