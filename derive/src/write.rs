use crate::{shape_fn, StructInfo};
use proc_macro2::TokenStream;
use quote::quote;

pub fn encode_impl(info: &StructInfo) -> TokenStream {
    let name = &info.name;
    let shape = shape_fn(info, quote!(::cbor_codec::EncodeFields));

    let encode_arms = info.fields.iter().enumerate().map(|(idx, f)| {
        let idx = idx as u32;
        let member = &f.member;
        if f.flatten {
            quote! {
                #idx => ::cbor_codec::EncodeFields::encode_field(&self.#member, &path[1..], e),
            }
        } else {
            quote! {
                #idx => ::cbor_codec::Encode::encode(&self.#member, e),
            }
        }
    });

    let empty_arms = info.fields.iter().enumerate().map(|(idx, f)| {
        let idx = idx as u32;
        let member = &f.member;
        if f.flatten {
            quote! {
                #idx => ::cbor_codec::EncodeFields::field_is_empty(&self.#member, &path[1..]),
            }
        } else {
            quote! {
                #idx => ::cbor_codec::Encode::is_empty_value(&self.#member),
            }
        }
    });

    quote! {
        impl ::cbor_codec::EncodeFields for #name {
            #shape

            fn encode_field<W: ::std::io::Write>(
                &self,
                path: &[u32],
                e: &mut ::cbor_codec::Encoder<'_, W>,
            ) -> ::cbor_codec::Result<()> {
                match path[0] {
                    #(#encode_arms)*
                    _ => ::core::unreachable!("field path out of range"),
                }
            }

            fn field_is_empty(&self, path: &[u32]) -> bool {
                match path[0] {
                    #(#empty_arms)*
                    _ => false,
                }
            }
        }

        impl ::cbor_codec::Encode for #name {
            fn encode<W: ::std::io::Write>(
                &self,
                e: &mut ::cbor_codec::Encoder<'_, W>,
            ) -> ::cbor_codec::Result<()> {
                ::cbor_codec::encode_struct(self, e)
            }
        }
    }
}
