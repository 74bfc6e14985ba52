mod assets;
mod mapper;
mod table_row;
mod transaction;

use proc_macro::TokenStream;

/// Embeds every XML mapper file matched by a glob pattern into the binary via
/// `include_str!` and registers a `ctor`-run function that loads them into the
/// global mapped-statement registry before `main` runs.
#[proc_macro]
pub fn mapper_assets(input: TokenStream) -> TokenStream {
    assets::mapper_assets_impl(input)
}

/// Generates a proxy struct implementing the annotated trait. Each method's
/// declared return shape (`Option<T>`, `Vec<T>`, `HashMap<K, T>`, `Cursor<T>`,
/// or a bare integer) selects which `Session` operation the call is forwarded
/// to; the statement id is `{namespace}.{method_name}`.
#[proc_macro_attribute]
pub fn mapper(args: TokenStream, input: TokenStream) -> TokenStream {
    mapper::mapper_impl(args, input)
}

/// Wraps an async function body in begin/commit/rollback against the
/// session bound to `database` (default `"default"`), committing only if the
/// body returns `Ok`.
#[proc_macro_attribute]
pub fn transaction(args: TokenStream, input: TokenStream) -> TokenStream {
    transaction::transaction_impl(args, input)
}

#[proc_macro_derive(TableRow, attributes(column))]
pub fn derive_table_row(input: TokenStream) -> TokenStream {
    table_row::derive_table_row_impl(input)
}
