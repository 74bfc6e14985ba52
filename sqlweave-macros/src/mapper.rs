use proc_macro::TokenStream;
use proc_macro2::Span;
use quote::{format_ident, quote};
use syn::{
    Expr, FnArg, GenericArgument, Ident, ItemTrait, Lit, LitStr, Meta, PathArguments, Result,
    ReturnType, Token, TraitItem, Type,
    parse::{Parse, ParseStream},
    parse_macro_input,
    punctuated::Punctuated,
};

struct MapperArgs {
    namespace: String,
}

impl Parse for MapperArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        if input.peek(LitStr) {
            let s: LitStr = input.parse()?;
            return Ok(MapperArgs { namespace: s.value() });
        }

        let metas: Punctuated<Meta, Token![,]> = Punctuated::parse_terminated(input)?;
        let mut namespace = None;
        for meta in metas {
            if let Meta::NameValue(nv) = meta
                && nv.path.is_ident("namespace")
                && let Expr::Lit(expr_lit) = &nv.value
                && let Lit::Str(lit_str) = &expr_lit.lit
            {
                namespace = Some(lit_str.value());
            }
        }
        Ok(MapperArgs {
            namespace: namespace.unwrap_or_default(),
        })
    }
}

/// What a method's declared return shape says about how to dispatch it.
enum Dispatch {
    One,
    List,
    Map(String),
    Cursor,
    Mutate,
}

/// Peel `sqlweave::Result<T>` (or a bare `Result<T, _>`) down to `T`.
fn result_inner(ty: &Type) -> Option<&Type> {
    let Type::Path(p) = ty else { return None };
    let seg = p.path.segments.last()?;
    if seg.ident != "Result" {
        return None;
    }
    let PathArguments::AngleBracketed(args) = &seg.arguments else {
        return None;
    };
    args.args.iter().find_map(|a| match a {
        GenericArgument::Type(t) => Some(t),
        _ => None,
    })
}

fn classify(output: &ReturnType, key_attr: Option<String>) -> Dispatch {
    let ReturnType::Type(_, ty) = output else {
        return Dispatch::Mutate;
    };
    let Some(inner) = result_inner(ty) else {
        return Dispatch::Mutate;
    };
    let Type::Path(p) = inner else {
        return Dispatch::Mutate;
    };
    let Some(seg) = p.path.segments.last() else {
        return Dispatch::Mutate;
    };
    match seg.ident.to_string().as_str() {
        "Option" => Dispatch::One,
        "Vec" => Dispatch::List,
        "HashMap" | "BTreeMap" => Dispatch::Map(key_attr.unwrap_or_else(|| "id".to_string())),
        "Cursor" => Dispatch::Cursor,
        _ => Dispatch::Mutate,
    }
}

fn key_attr_of(attrs: &[syn::Attribute]) -> Option<String> {
    attrs.iter().find_map(|attr| {
        if !attr.path().is_ident("key") {
            return None;
        }
        attr.parse_args::<LitStr>().ok().map(|s| s.value())
    })
}

pub fn mapper_impl(args: TokenStream, input: TokenStream) -> TokenStream {
    let mapper_args = parse_macro_input!(args as MapperArgs);
    let item_trait = parse_macro_input!(input as ItemTrait);

    let trait_name = &item_trait.ident;
    let namespace = &mapper_args.namespace;
    let proxy_name = format_ident!("{}Proxy", trait_name);

    let mut methods = Vec::new();
    for item in &item_trait.items {
        let TraitItem::Fn(m) = item else { continue };
        let sig = &m.sig;
        let method_name = &sig.ident;
        let stmt_id = format!("{}.{}", namespace, method_name);
        let stmt_id_lit = LitStr::new(&stmt_id, Span::call_site());

        let mut struct_fields = Vec::new();
        let mut field_inits = Vec::new();
        for arg in sig.inputs.iter() {
            let FnArg::Typed(pat_type) = arg else { continue };
            let syn::Pat::Ident(pat_ident) = &*pat_type.pat else {
                continue;
            };
            let ident = &pat_ident.ident;
            let ty = &pat_type.ty;
            struct_fields.push(quote! { #ident: &'a #ty });
            field_inits.push(quote! { #ident: &#ident });
        }

        let dispatch = classify(&sig.output, key_attr_of(&m.attrs));
        let call = match dispatch {
            Dispatch::One => quote! { self.session.select_one(#stmt_id_lit, &__args).await },
            Dispatch::List => quote! { self.session.select_list(#stmt_id_lit, &__args, None).await },
            Dispatch::Map(key) => {
                let key_lit = LitStr::new(&key, Span::call_site());
                quote! { self.session.select_map(#stmt_id_lit, &__args, #key_lit, None).await }
            }
            Dispatch::Cursor => quote! { self.session.select_cursor(#stmt_id_lit, &__args, None).await },
            Dispatch::Mutate => quote! { self.session.execute_mapped(#stmt_id_lit, &__args).await },
        };

        let inputs = &sig.inputs;
        let output = &sig.output;
        let args_struct_name = format_ident!("__SqlweaveArgs_{}", method_name);

        methods.push(quote! {
            async fn #method_name(#inputs) #output {
                #[derive(serde::Serialize)]
                struct #args_struct_name<'a> {
                    #(#struct_fields),*
                }
                let __args = #args_struct_name { #(#field_inits),* };
                #call
            }
        });
    }

    let vis = &item_trait.vis;
    let trait_ident: &Ident = trait_name;

    let expanded = quote! {
        #item_trait

        #vis struct #proxy_name {
            session: sqlweave::session::Session,
        }

        impl #proxy_name {
            pub fn new(session: sqlweave::session::Session) -> Self {
                Self { session }
            }
        }

        #[async_trait::async_trait]
        impl #trait_ident for #proxy_name {
            #(#methods)*
        }
    };

    TokenStream::from(expanded)
}
