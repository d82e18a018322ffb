//! Attribute macros for shopload reporting types.
//!
//! Both macros stamp the trait set the reporting pipeline relies on
//! (serde round-tripping, comparison, debug, clone) onto a plain struct, so
//! a sample or a tally can be declared without a wall of derives.

use proc_macro::TokenStream;
use quote::quote;
use syn::{ItemStruct, parse_macro_input};

extern crate proc_macro;

/// Turns a struct into a `shopload::Metric`.
#[proc_macro_attribute]
pub fn metric(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as ItemStruct);
    let input_struct = &ast.ident;
    let (impl_generics, ty_generics, where_clause) = ast.generics.split_for_impl();
    let expanded = quote! {
        #[derive(
            serde::Serialize,
            serde::Deserialize,
            std::cmp::PartialOrd,
            std::cmp::PartialEq,
            std::fmt::Debug,
            std::clone::Clone
        )]
        #ast

        impl #impl_generics ::shopload::Metric for #input_struct #ty_generics #where_clause {}
    };

    TokenStream::from(expanded)
}

/// Derives everything `shopload::Aggregate` requires of its implementor,
/// plus `Default` as the empty tally every session starts from.
///
/// Fields must be `Default` themselves. The `Aggregate` impl stays
/// hand-written since `consume` and `merge` are the interesting part;
/// `Aggregate::new` can simply return `Self::default()`.
#[proc_macro_attribute]
pub fn aggregate(_attr: TokenStream, item: TokenStream) -> TokenStream {
    let ast = parse_macro_input!(item as ItemStruct);
    let expanded = quote! {
        #[derive(
            serde::Serialize,
            serde::Deserialize,
            std::cmp::PartialOrd,
            std::cmp::PartialEq,
            std::fmt::Debug,
            std::clone::Clone,
            std::default::Default
        )]
        #ast
    };

    TokenStream::from(expanded)
}
