use proc_macro::TokenStream;
use proc_macro2::TokenStream as TokenStream2;
use quote::quote;
use syn::{parse_macro_input, Data, DeriveInput, Expr, Fields, Index, LitInt, Member};

/// Per-field options from `#[kafka(...)]`.
#[derive(Default)]
struct FieldOptions {
    /// First protocol version the field is on the wire.
    min_version: Option<i16>,
    /// Value taken by the field when decoding an older version.
    default: Option<Expr>,
}

#[derive(Clone, Copy)]
enum Shape {
    Named,
    Unnamed,
    Unit,
}

struct FieldInfo {
    member: Member,
    ty: syn::Type,
    options: FieldOptions,
}

fn parse_fields(input: &DeriveInput) -> syn::Result<(Vec<FieldInfo>, Shape)> {
    let data = match &input.data {
        Data::Struct(data) => data,
        _ => {
            return Err(syn::Error::new_spanned(
                &input.ident,
                "kafka codecs can only be derived for structs",
            ))
        }
    };

    let shape = match data.fields {
        Fields::Named(_) => Shape::Named,
        Fields::Unnamed(_) => Shape::Unnamed,
        Fields::Unit => Shape::Unit,
    };
    let mut fields = Vec::new();
    for (idx, field) in data.fields.iter().enumerate() {
        let member = match &field.ident {
            Some(ident) => Member::Named(ident.clone()),
            None => Member::Unnamed(Index::from(idx)),
        };

        let mut options = FieldOptions::default();
        for attr in field.attrs.iter().filter(|attr| attr.path().is_ident("kafka")) {
            attr.parse_nested_meta(|meta| {
                if meta.path.is_ident("min_version") {
                    let lit: LitInt = meta.value()?.parse()?;
                    options.min_version = Some(lit.base10_parse()?);
                    Ok(())
                } else if meta.path.is_ident("default") {
                    options.default = Some(meta.value()?.parse()?);
                    Ok(())
                } else {
                    Err(meta.error("expected `min_version` or `default`"))
                }
            })?;
        }

        fields.push(FieldInfo {
            member,
            ty: field.ty.clone(),
            options,
        });
    }
    Ok((fields, shape))
}

fn construct(
    name: &syn::Ident,
    fields: &[FieldInfo],
    shape: Shape,
    values: Vec<TokenStream2>,
) -> TokenStream2 {
    match shape {
        Shape::Named => {
            let members = fields.iter().map(|f| &f.member);
            quote! { #name { #(#members: #values,)* } }
        }
        Shape::Unnamed => quote! { #name ( #(#values,)* ) },
        Shape::Unit => quote! { #name },
    }
}

fn expand(
    input: TokenStream,
    derive: fn(&DeriveInput, Vec<FieldInfo>, Shape) -> TokenStream2,
) -> TokenStream {
    let input = parse_macro_input!(input as DeriveInput);
    match parse_fields(&input) {
        Ok((fields, shape)) => derive(&input, fields, shape).into(),
        Err(err) => err.to_compile_error().into(),
    }
}

#[proc_macro_derive(Encode, attributes(kafka))]
pub fn derive_encode(input: TokenStream) -> TokenStream {
    expand(input, |input, fields, _| {
        let name = &input.ident;
        let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
        let encodes = fields.iter().map(|field| {
            let member = &field.member;
            quote! { crate::encode::Encode::encode(&self.#member, pe)?; }
        });

        quote! {
            impl #impl_generics crate::encode::Encode for #name #ty_generics #where_clause {
                fn encode(&self, pe: &mut dyn crate::encode::PacketEncoder) -> crate::encode::EncodeResult<()> {
                    #(#encodes)*
                    Ok(())
                }
            }
        }
    })
}

#[proc_macro_derive(Decode, attributes(kafka))]
pub fn derive_decode(input: TokenStream) -> TokenStream {
    expand(input, |input, fields, shape| {
        let name = &input.ident;
        let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
        let values = fields
            .iter()
            .map(|field| {
                let ty = &field.ty;
                quote! { <#ty as crate::decode::Decode>::decode(pd)? }
            })
            .collect();
        let body = construct(name, &fields, shape, values);

        quote! {
            impl #impl_generics crate::decode::Decode for #name #ty_generics #where_clause {
                fn decode(pd: &mut crate::decode::PacketDecoder<'_>) -> crate::decode::DecodeResult<Self> {
                    Ok(#body)
                }
            }
        }
    })
}

#[proc_macro_derive(VersionedEncode, attributes(kafka))]
pub fn derive_versioned_encode(input: TokenStream) -> TokenStream {
    expand(input, |input, fields, _| {
        let name = &input.ident;
        let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
        let encodes = fields.iter().map(|field| {
            let member = &field.member;
            let encode = quote! {
                crate::encode::VersionedEncode::encode_versioned(&self.#member, pe, version)?;
            };
            match field.options.min_version {
                Some(min) => quote! { if version >= #min { #encode } },
                None => encode,
            }
        });

        quote! {
            impl #impl_generics crate::encode::VersionedEncode for #name #ty_generics #where_clause {
                #[allow(unused_variables)]
                fn encode_versioned(
                    &self,
                    pe: &mut dyn crate::encode::PacketEncoder,
                    version: i16,
                ) -> crate::encode::EncodeResult<()> {
                    #(#encodes)*
                    Ok(())
                }
            }
        }
    })
}

#[proc_macro_derive(VersionedDecode, attributes(kafka))]
pub fn derive_versioned_decode(input: TokenStream) -> TokenStream {
    expand(input, |input, fields, shape| {
        let name = &input.ident;
        let (impl_generics, ty_generics, where_clause) = input.generics.split_for_impl();
        let values = fields
            .iter()
            .map(|field| {
                let ty = &field.ty;
                let decode = quote! {
                    <#ty as crate::decode::VersionedDecode>::decode_versioned(pd, version)?
                };
                let default = match &field.options.default {
                    Some(expr) => quote! { #expr },
                    None => quote! { <#ty as ::std::default::Default>::default() },
                };
                match field.options.min_version {
                    Some(min) => quote! { if version >= #min { #decode } else { #default } },
                    None => decode,
                }
            })
            .collect();
        let body = construct(name, &fields, shape, values);

        quote! {
            impl #impl_generics crate::decode::VersionedDecode for #name #ty_generics #where_clause {
                #[allow(unused_variables)]
                fn decode_versioned(
                    pd: &mut crate::decode::PacketDecoder<'_>,
                    version: i16,
                ) -> crate::decode::DecodeResult<Self> {
                    Ok(#body)
                }
            }
        }
    })
}
