use glob::glob;
use proc_macro::TokenStream;
use quote::{format_ident, quote};
use std::collections::hash_map::DefaultHasher;
use std::env;
use std::hash::{Hash, Hasher};
use std::path::PathBuf;
use syn::{LitStr, parse_macro_input};

pub fn mapper_assets_impl(input: TokenStream) -> TokenStream {
    // 1) Parse the input string literal (glob pattern).
    let pattern = parse_macro_input!(input as LitStr);
    let pattern_str = pattern.value();

    // 2) Get the crate root directory.
    // CARGO_MANIFEST_DIR is set by Cargo at compile time and points to the
    // directory containing Cargo.toml.
    let manifest_dir = env::var("CARGO_MANIFEST_DIR")
        .expect("CARGO_MANIFEST_DIR environment variable not set");
    let root = PathBuf::from(manifest_dir);

    // 3) Build the full glob pattern path.
    let full_pattern = root.join(&pattern_str);
    let full_pattern_str = full_pattern.to_string_lossy();

    // 4) Find matching files.
    let files: Vec<String> = match glob(&full_pattern_str) {
        Ok(paths) => paths
            .filter_map(|entry| entry.ok())
            .filter(|path| path.is_file())
            .map(|path| path.to_string_lossy().to_string())
            .collect(),
        Err(e) => {
            return syn::Error::new(pattern.span(), format!("invalid glob pattern: {}", e))
                .to_compile_error()
                .into();
        }
    };

    // 5) Generate tuples of (path, content). `include_str!` embeds file
    // contents at compile time so the loaded binary never touches the
    // filesystem for mapper XML.
    let assets: Vec<_> = files
        .iter()
        .map(|f| {
            quote! {
                (#f, include_str!(#f))
            }
        })
        .collect();

    // 6) Derive a unique registration function name from the pattern so the
    // macro can be invoked more than once in the same scope.
    let mut hasher = DefaultHasher::new();
    pattern_str.hash(&mut hasher);
    let hash = hasher.finish();
    let fn_name = format_ident!("__sqlweave_register_assets_{}", hash);

    // 7) `#[sqlweave::ctor::ctor]` runs this function before `main`, loading
    // every embedded mapper file into the global registry.
    let output = quote! {
        #[sqlweave::ctor::ctor]
        fn #fn_name() {
            let assets = vec![
                #(#assets),*
            ];
            if let Err(e) = sqlweave::registry::xml::load_assets(assets) {
                eprintln!("sqlweave: failed to register mapper assets: {e}");
            }
        }
    };

    output.into()
}
