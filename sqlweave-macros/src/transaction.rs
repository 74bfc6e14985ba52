use proc_macro::TokenStream;
use quote::quote;
use syn::{
    Expr, ItemFn, Lit, LitStr, Meta, Result, Token, parse::Parse, parse::ParseStream,
    parse_macro_input, punctuated::Punctuated,
};

struct TransactionArgs {
    database: Option<String>,
}

impl Parse for TransactionArgs {
    fn parse(input: ParseStream) -> Result<Self> {
        let mut database = None;
        if !input.is_empty() {
            let metas: Punctuated<Meta, Token![,]> = Punctuated::parse_terminated(input)?;
            for meta in metas {
                if let Meta::NameValue(nv) = meta
                    && let Some(ident) = nv.path.get_ident()
                    && ident == "database"
                    && let Expr::Lit(expr_lit) = &nv.value
                    && let Lit::Str(lit_str) = &expr_lit.lit
                {
                    database = Some(lit_str.value());
                }
            }
        }
        Ok(TransactionArgs { database })
    }
}

/// Wraps the body in `session.begin()` / `commit()` / `rollback()`, where
/// `session` is an owned `sqlweave::session::Session` pulled from the named
/// environment's session factory. Nested `#[transaction]` calls against a
/// session that already has an open transaction just run the body inline and
/// let the outermost call own the commit/rollback.
pub fn transaction_impl(args: TokenStream, input: TokenStream) -> TokenStream {
    let args = parse_macro_input!(args as TransactionArgs);
    let mut func = parse_macro_input!(input as ItemFn);

    let block = &func.block;

    let db_name = args.database.unwrap_or_else(|| "default".to_string());
    let db_name_lit = LitStr::new(&db_name, proc_macro2::Span::call_site());
    let new_block = quote! {
        {
            let mut __sqlweave_session = sqlweave::environment::global()
                .session_factory(#db_name_lit)
                .expect("database environment not registered")
                .open_session();

            let __sqlweave_tx_started = !__sqlweave_session.is_transaction_active();
            if __sqlweave_tx_started {
                __sqlweave_session.begin().await?;
            }

            let session = &mut __sqlweave_session;
            let __sqlweave_result = (async move #block).await;

            if __sqlweave_tx_started {
                if __sqlweave_result.is_ok() {
                    __sqlweave_session.commit().await?;
                } else {
                    __sqlweave_session.rollback().await?;
                }
            }

            __sqlweave_result
        }
    };

    func.block = syn::parse2(new_block).expect("failed to parse transaction body");

    quote! {
        #func
    }
    .into()
}
