use super::{unit_tokens, Artifact, UnitSet};
use crate::error::{Error, SchemaError};
use crate::model::{Field, Model};
use crate::naming;
use crate::pipeline::Settings;
use log::debug;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

fn field_label(model: &Model, field: &Field) -> String {
    format!("{}.{}", model.model_name(), field.name)
}

fn field_tokens(model: &Model, field: &Field) -> Result<TokenStream, Error> {
    let ident = naming::ident(&field.name);
    let ty: syn::Type = syn::parse_str(&field.target_type).map_err(|err| SchemaError::InvalidSource {
        context: field_label(model, field),
        message: format!("field type '{}': {}", field.target_type, err),
    })?;

    let mut attrs = TokenStream::new();
    if !field.tags.is_empty() {
        let doc = format!("gorm:\"{}\"", field.tags);
        attrs.extend(quote! { #[doc = #doc] });
    }
    if field.json_tag == "-" {
        attrs.extend(quote! { #[serde(skip)] });
    } else {
        let json = &field.json_tag;
        attrs.extend(quote! { #[serde(rename = #json)] });
    }
    Ok(quote! {
        #attrs
        pub #ident: #ty
    })
}

fn clause_helpers(units: &UnitSet) -> TokenStream {
    let mut helpers = TokenStream::new();
    if units.units().any(|unit| unit.uses_where) {
        helpers.extend(quote! {
            /// `WHERE` plus the clause body, with dangling `AND`/`OR` removed;
            /// empty when nothing is left
            fn where_clause(body: &str) -> String {
                fn strip<'s>(text: &'s str, word: &str) -> &'s str {
                    let text = text.trim();
                    let n = word.len();
                    let head = text.get(..n).filter(|head| head.eq_ignore_ascii_case(word));
                    if head.is_some() && text[n..].chars().next().map_or(true, char::is_whitespace) {
                        return &text[n..];
                    }
                    let split = text.len().saturating_sub(n);
                    let tail = text.get(split..).filter(|tail| tail.eq_ignore_ascii_case(word));
                    if tail.is_some() && text[..split].chars().last().map_or(true, char::is_whitespace) {
                        return &text[..split];
                    }
                    text
                }
                let mut text = body.trim();
                loop {
                    let before = text.len();
                    text = strip(strip(text, "AND"), "OR").trim();
                    if text.len() == before {
                        break;
                    }
                }
                if text.is_empty() {
                    String::new()
                } else {
                    format!("WHERE {}", text)
                }
            }
        });
    }
    if units.units().any(|unit| unit.uses_set) {
        helpers.extend(quote! {
            /// `SET` plus the clause body, with dangling commas removed
            fn set_clause(body: &str) -> String {
                let text = body.trim_matches(|c: char| c == ',' || c.is_whitespace());
                if text.is_empty() {
                    String::new()
                } else {
                    format!("SET {}", text)
                }
            }
        });
    }
    helpers
}

/// Render `<module>.gen.rs` for one model: the row struct with its tags,
/// the `FromQueryResult` decoding, the `<Model>Do` query object and every
/// surviving unit in name order.
pub fn render_model_artifact(model: &Model, units: &UnitSet, settings: &Settings) -> Result<Artifact, Error> {
    let model_ident = naming::ident(model.model_name());
    let do_ident = format_ident!("{}", model.names.do_name());
    let table = model.table_name();

    let fields = model
        .fields
        .iter()
        .map(|field| field_tokens(model, field))
        .collect::<Result<Vec<_>, _>>()?;
    let decoders: Vec<TokenStream> = model
        .fields
        .iter()
        .map(|field| {
            let ident = naming::ident(&field.name);
            if field.is_relation() {
                quote! { #ident: ::core::default::Default::default() }
            } else {
                let column = &field.column;
                quote! { #ident: row.try_get(pre, #column)? }
            }
        })
        .collect();
    let columns: Vec<&str> = model.scalar_fields().map(|field| field.column.as_str()).collect();
    let methods = model
        .methods
        .iter()
        .map(|method| {
            method.parse::<TokenStream>().map_err(|err| {
                Error::from(SchemaError::InvalidSource {
                    context: format!("{} method", model.model_name()),
                    message: err.to_string(),
                })
            })
        })
        .collect::<Result<Vec<_>, _>>()?;

    let mut signatures = Vec::new();
    let mut bodies = Vec::new();
    for unit in units.units() {
        signatures.push(unit_tokens(unit, &unit.signature)?);
        bodies.push(unit_tokens(unit, &unit.body)?);
    }
    let query_methods = if settings.query_interface {
        let interface = format_ident!("{}", model.names.interface_name());
        quote! {
            #[allow(async_fn_in_trait)]
            pub trait #interface {
                #( #signatures; )*
            }

            impl<'a, C: ::sea_orm::ConnectionTrait> #interface for #do_ident<'a, C> {
                #( #signatures #bodies )*
            }
        }
    } else {
        quote! {
            impl<'a, C: ::sea_orm::ConnectionTrait> #do_ident<'a, C> {
                #( pub #signatures #bodies )*
            }
        }
    };
    let helpers = clause_helpers(units);

    debug!(
        "rendering {} with {} field(s) and {} method(s)",
        model.names.file_name(),
        fields.len(),
        signatures.len()
    );

    let tokens = quote! {
        #![allow(dead_code, unused_variables, clippy::all)]

        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct #model_ident {
            #( #fields, )*
        }

        impl #model_ident {
            pub const TABLE_NAME: &'static str = #table;
            pub const COLUMNS: &'static [&'static str] = &[#( #columns ),*];

            #( #methods )*
        }

        impl ::sea_orm::FromQueryResult for #model_ident {
            fn from_query_result(
                row: &::sea_orm::QueryResult,
                pre: &str,
            ) -> ::std::result::Result<Self, ::sea_orm::DbErr> {
                Ok(Self {
                    #( #decoders, )*
                })
            }
        }

        /// Query object bound to a connection
        pub struct #do_ident<'a, C: ::sea_orm::ConnectionTrait> {
            db: &'a C,
        }

        impl<'a, C: ::sea_orm::ConnectionTrait> #do_ident<'a, C> {
            pub fn new(db: &'a C) -> Self {
                Self { db }
            }
        }

        #query_methods

        #helpers
    };

    Ok(Artifact::new(model.names.file_name(), model.names.module_name.clone(), tokens))
}

/// Render `<module>.gen_test.rs`: smoke tests of the generated row type
pub fn render_test_artifact(model: &Model) -> Artifact {
    let module = naming::ident(&model.names.module_name);
    let model_ident = naming::ident(model.model_name());
    let table = model.table_name();
    let column_count = model.scalar_fields().count();
    let prefix = model.names.module_name.trim_start_matches("r#");
    let table_test = format_ident!("test_{}_table_name", prefix);
    let clone_test = format_ident!("test_{}_default_clone", prefix);
    let columns_test = format_ident!("test_{}_columns", prefix);

    let tokens = quote! {
        use super::#module::#model_ident;

        #[test]
        fn #table_test() {
            assert_eq!(#model_ident::TABLE_NAME, #table);
        }

        #[test]
        fn #clone_test() {
            let row = #model_ident::default();
            assert_eq!(row.clone(), row);
        }

        #[test]
        fn #columns_test() {
            assert_eq!(#model_ident::COLUMNS.len(), #column_count);
        }
    };

    Artifact::new(
        model.names.test_file_name(),
        format!("{}_test", prefix),
        tokens,
    )
}
