use crate::{shape_fn, StructInfo};
use proc_macro2::TokenStream;
use quote::quote;

pub fn decode_impl(info: &StructInfo) -> TokenStream {
    let name = &info.name;
    let shape = shape_fn(info, quote!(::cbor_codec::DecodeFields));

    let arms = info.fields.iter().enumerate().map(|(idx, f)| {
        let idx = idx as u32;
        let member = &f.member;
        if f.flatten {
            quote! {
                #idx => ::cbor_codec::DecodeFields::decode_field(
                    &mut self.#member,
                    &path[1..],
                    item,
                    ctx,
                ),
            }
        } else {
            quote! {
                #idx => ::cbor_codec::Decode::decode_into(&mut self.#member, item, ctx),
            }
        }
    });

    quote! {
        impl ::cbor_codec::DecodeFields for #name {
            #shape

            fn decode_field(
                &mut self,
                path: &[u32],
                item: ::cbor_codec::TaggedItem<'_>,
                ctx: &::cbor_codec::DecCtx<'_>,
            ) -> ::cbor_codec::Result<()> {
                match path[0] {
                    #(#arms)*
                    _ => ::core::result::Result::Ok(()),
                }
            }
        }

        impl ::cbor_codec::Decode for #name {
            fn decode(
                item: ::cbor_codec::TaggedItem<'_>,
                ctx: &::cbor_codec::DecCtx<'_>,
            ) -> ::cbor_codec::Result<Self> {
                ::cbor_codec::decode_struct(item, ctx)
            }

            fn decode_into(
                &mut self,
                item: ::cbor_codec::TaggedItem<'_>,
                ctx: &::cbor_codec::DecCtx<'_>,
            ) -> ::cbor_codec::Result<()> {
                ::cbor_codec::decode_struct_into(self, item, ctx)
            }
        }
    }
}
