//! Derive macros for DNS wire structures.
//!
//! `DnsStruct` stitches together field-by-field `ToFromNetworkOrder`
//! (de)serialization for a struct; `DnsEnum` generates `Default`,
//! `TryFrom<u8>`, `TryFrom<u16>` and `FromStr` for C-like discriminant enums.
use proc_macro::TokenStream;
use syn::{parse_macro_input, DeriveInput};

mod dns_struct;
use dns_struct::dns_derive;

mod dns_enum;
use dns_enum::dns_enum;

#[proc_macro_derive(DnsStruct)]
pub fn dns_macro_struct(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    dns_derive(&ast)
}

#[proc_macro_derive(DnsEnum)]
pub fn dns_macro_enum(input: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(input as DeriveInput);
    dns_enum(&ast)
}

#[cfg(test)]
fn get_derive_input(s: &str) -> DeriveInput {
    syn::parse_str(s).expect("test input should be a valid item")
}
