use proc_macro2::TokenStream;
use quote::quote;
use syn::{
    parse_macro_input, Attribute, Data, DataStruct, DeriveInput, Error, Fields, Lit, Meta,
    NestedMeta, Type,
};

mod read;
mod write;

/// One field as seen by the derive: how to reach it and what the
/// annotations said.
struct FieldInfo {
    member: syn::Member,
    ty: Type,
    cbor_tag: Option<String>,
    json_tag: Option<String>,
    flatten: bool,
}

struct StructInfo {
    name: syn::Ident,
    to_array: bool,
    fields: Vec<FieldInfo>,
}

fn container_to_array(attrs: &[Attribute]) -> Result<bool, Error> {
    for attr in attrs {
        if !attr.path.is_ident("cbor") {
            continue;
        }
        if let Meta::List(list) = attr.parse_meta()? {
            for nested in list.nested {
                match nested {
                    NestedMeta::Meta(Meta::Path(p)) if p.is_ident("toarray") => return Ok(true),
                    other => {
                        return Err(Error::new_spanned(
                            other,
                            "expected `#[cbor(toarray)]` on the container",
                        ))
                    }
                }
            }
        }
    }
    Ok(false)
}

fn field_annotations(
    attrs: &[Attribute],
) -> Result<(Option<String>, Option<String>, bool), Error> {
    let mut cbor_tag = None;
    let mut json_tag = None;
    let mut flatten = false;
    for attr in attrs {
        let is_cbor = attr.path.is_ident("cbor");
        let is_json = attr.path.is_ident("json");
        if !is_cbor && !is_json {
            continue;
        }
        if let Meta::List(list) = attr.parse_meta()? {
            for nested in list.nested {
                match nested {
                    NestedMeta::Lit(Lit::Str(s)) => {
                        if is_cbor {
                            cbor_tag = Some(s.value());
                        } else {
                            json_tag = Some(s.value());
                        }
                    }
                    NestedMeta::Meta(Meta::Path(p)) if is_cbor && p.is_ident("flatten") => {
                        flatten = true;
                    }
                    other => {
                        return Err(Error::new_spanned(
                            other,
                            "expected `#[cbor(\"name,options\")]` or `#[cbor(flatten)]`",
                        ))
                    }
                }
            }
        }
    }
    Ok((cbor_tag, json_tag, flatten))
}

fn collect(input: DeriveInput) -> Result<StructInfo, Error> {
    let name = input.ident;
    if !input.generics.params.is_empty() {
        return Err(Error::new_spanned(
            &input.generics,
            "generic structs are not supported: the field directory is cached by concrete type",
        ));
    }
    let mut to_array = container_to_array(&input.attrs)?;
    let fields = match input.data {
        Data::Struct(DataStruct { fields, .. }) => match fields {
            Fields::Named(named) => named
                .named
                .into_iter()
                .map(|f| {
                    let (cbor_tag, json_tag, flatten) = field_annotations(&f.attrs)?;
                    Ok(FieldInfo {
                        member: syn::Member::Named(f.ident.clone().expect("named field")),
                        ty: f.ty,
                        cbor_tag,
                        json_tag,
                        flatten,
                    })
                })
                .collect::<Result<Vec<_>, Error>>()?,
            Fields::Unnamed(unnamed) => {
                // tuple structs are positional by nature
                to_array = true;
                unnamed
                    .unnamed
                    .into_iter()
                    .enumerate()
                    .map(|(idx, f)| {
                        let (cbor_tag, json_tag, flatten) = field_annotations(&f.attrs)?;
                        Ok(FieldInfo {
                            member: syn::Member::Unnamed(syn::Index::from(idx)),
                            ty: f.ty,
                            cbor_tag,
                            json_tag,
                            flatten,
                        })
                    })
                    .collect::<Result<Vec<_>, Error>>()?
            }
            Fields::Unit => {
                return Err(Error::new_spanned(
                    name,
                    "unit structs have no CBOR representation",
                ))
            }
        },
        Data::Enum(e) => {
            return Err(Error::new(
                e.enum_token.span,
                "enums are not supported; encode a struct or a Value",
            ))
        }
        Data::Union(u) => {
            return Err(Error::new(u.union_token.span, "unions are not supported"))
        }
    };
    Ok(StructInfo {
        name,
        to_array,
        fields,
    })
}

fn member_name(member: &syn::Member) -> String {
    match member {
        syn::Member::Named(ident) => ident.to_string(),
        syn::Member::Unnamed(index) => index.index.to_string(),
    }
}

/// Body of the generated `shape()` associated function. `shape_of` names
/// the trait whose `shape` is referenced for flattened fields, so encode-
/// only and decode-only types both work.
fn shape_fn(info: &StructInfo, shape_of: TokenStream) -> TokenStream {
    let name_str = info.name.to_string();
    let to_array = info.to_array;
    let specs = info.fields.iter().map(|f| {
        let field_name = member_name(&f.member);
        let cbor_tag = match &f.cbor_tag {
            Some(tag) => quote!(::core::option::Option::Some(#tag)),
            None => quote!(::core::option::Option::None),
        };
        let json_tag = match &f.json_tag {
            Some(tag) => quote!(::core::option::Option::Some(#tag)),
            None => quote!(::core::option::Option::None),
        };
        let flatten = if f.flatten {
            let ty = &f.ty;
            quote!(::core::option::Option::Some(<#ty as #shape_of>::shape))
        } else {
            quote!(::core::option::Option::None)
        };
        quote! {
            ::cbor_codec::FieldSpec {
                name: #field_name,
                cbor_tag: #cbor_tag,
                json_tag: #json_tag,
                flatten: #flatten,
            }
        }
    });
    quote! {
        fn shape() -> &'static ::cbor_codec::TypeShape {
            const FIELDS: &[::cbor_codec::FieldSpec] = &[#(#specs),*];
            static SHAPE: ::cbor_codec::TypeShape = ::cbor_codec::TypeShape {
                name: #name_str,
                to_array: #to_array,
                fields: FIELDS,
            };
            &SHAPE
        }
    }
}

/// Derive `Encode` for a struct.
///
/// Field annotations use the comma-separated grammar
/// `#[cbor("name,omitempty,keyasint")]` with `#[json("...")]` as fallback;
/// `#[cbor(flatten)]` lifts an embedded struct's fields, and the container
/// attribute `#[cbor(toarray)]` encodes the struct as a positional array.
#[proc_macro_derive(Encode, attributes(cbor, json))]
pub fn derive_encode(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match collect(input) {
        Ok(info) => write::encode_impl(&info).into(),
        Err(e) => e.into_compile_error().into(),
    }
}

/// Derive `Decode` for a struct; requires `Default` for the starting value.
///
/// See [`macro@Encode`] for the annotation grammar.
#[proc_macro_derive(Decode, attributes(cbor, json))]
pub fn derive_decode(input: proc_macro::TokenStream) -> proc_macro::TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match collect(input) {
        Ok(info) => read::decode_impl(&info).into(),
        Err(e) => e.into_compile_error().into(),
    }
}
