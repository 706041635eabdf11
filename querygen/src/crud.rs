//! Built-in CRUD units generated for every model.

use crate::dialect::Dialect;
use crate::model::{Field, Model};
use crate::naming;
use crate::synth::signature::{execution, ReturnShape};
use crate::synth::{GenerationUnit, Origin};
use log::debug;
use proc_macro2::TokenStream;
use quote::quote;
use syn::Type;

/// A query whose SQL text is fixed at generation time
pub(crate) struct StaticQuery {
    pub name: String,
    /// Parameters after `&self`
    pub inputs: TokenStream,
    /// Success type, `gen::T` standing for the model
    pub returns: Type,
    pub sql: String,
    /// Bound values, in placeholder order
    pub values: Vec<TokenStream>,
}

impl StaticQuery {
    pub fn into_unit(self, model: &Model, dialect: Dialect, origin: Origin) -> GenerationUnit {
        let model_ident = naming::ident(model.model_name());
        let returns = &self.returns;
        let declared: Type = syn::parse_quote!(::std::result::Result<#returns, ::sea_orm::DbErr>);
        let shape = ReturnShape::classify(Some(&declared), &model_ident);
        let run = execution(&shape, dialect, &self.name);
        let method = naming::ident(&self.name);
        let (inputs, ok_type, sql, values) = (&self.inputs, &shape.ok_type, &self.sql, &self.values);
        let signature = quote! {
            async fn #method(&self, #inputs) -> ::std::result::Result<#ok_type, ::sea_orm::DbErr>
        };
        let body = quote! {
            let __sql = String::from(#sql);
            let __values: Vec<::sea_orm::Value> = vec![#(#values),*];
            #run
        };
        GenerationUnit::new(model, &self.name, origin, signature, body)
    }
}

/// Quoted column list, optionally qualified with the quoted table name
pub(crate) fn select_list(model: &Model, dialect: Dialect, qualified: bool) -> String {
    let table = dialect.quote_ident(model.table_name());
    model
        .scalar_fields()
        .map(|field| {
            let column = dialect.quote_ident(&field.column);
            if qualified {
                format!("{}.{}", table, column)
            } else {
                column
            }
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// `a = ?` pairs joined by `separator`, placeholders numbered from `start`
pub(crate) fn assignments(
    columns: impl IntoIterator<Item = String>,
    dialect: Dialect,
    start: usize,
    separator: &str,
) -> String {
    columns
        .into_iter()
        .enumerate()
        .map(|(index, column)| format!("{} = {}", column, dialect.placeholder(start + index)))
        .collect::<Vec<_>>()
        .join(separator)
}

/// `::sea_orm::Value` from a field of the row bound to `binding`
pub(crate) fn field_value(binding: &TokenStream, field: &Field) -> TokenStream {
    let ident = naming::ident(&field.name);
    quote! { ::sea_orm::Value::from(#binding.#ident.clone()) }
}

/// Built-in units for `model`.
///
/// `find`, `first`, `take`, `count` and `create` are always present; `last`
/// and the `*_by_pk` family need a primary key.
pub fn builtin_units(model: &Model, dialect: Dialect) -> Vec<GenerationUnit> {
    let model_ident = naming::ident(model.model_name());
    let table = dialect.quote_ident(model.table_name());
    let select = format!("SELECT {} FROM {}", select_list(model, dialect, false), table);
    let row = quote!(row);
    let mut queries = Vec::new();

    queries.push(StaticQuery {
        name: "find".to_string(),
        inputs: TokenStream::new(),
        returns: syn::parse_quote!(Vec<gen::T>),
        sql: select.clone(),
        values: Vec::new(),
    });
    queries.push(StaticQuery {
        name: "take".to_string(),
        inputs: TokenStream::new(),
        returns: syn::parse_quote!(Option<gen::T>),
        sql: format!("{} LIMIT 1", select),
        values: Vec::new(),
    });
    queries.push(StaticQuery {
        name: "count".to_string(),
        inputs: TokenStream::new(),
        returns: syn::parse_quote!(i64),
        sql: format!("SELECT COUNT(*) FROM {}", table),
        values: Vec::new(),
    });

    let insertable: Vec<&Field> = model.scalar_fields().filter(|field| !field.is_auto_increment()).collect();
    let insert = if insertable.is_empty() {
        match dialect {
            Dialect::MySql => format!("INSERT INTO {} () VALUES ()", table),
            Dialect::Postgres | Dialect::Sqlite => format!("INSERT INTO {} DEFAULT VALUES", table),
        }
    } else {
        format!(
            "INSERT INTO {} ({}) VALUES ({})",
            table,
            insertable
                .iter()
                .map(|field| dialect.quote_ident(&field.column))
                .collect::<Vec<_>>()
                .join(", "),
            dialect.placeholders(1, insertable.len())
        )
    };
    queries.push(StaticQuery {
        name: "create".to_string(),
        inputs: quote! { row: &#model_ident },
        returns: syn::parse_quote!(gen::RowsAffected),
        sql: insert,
        values: insertable.iter().map(|field| field_value(&row, field)).collect(),
    });

    let primary_key = model
        .primary_key_field()
        .and_then(|field| syn::parse_str::<Type>(&field.target_type).ok().map(|ty| (field, ty)));
    match primary_key {
        Some((pk, pk_type)) => {
            let pk_column = dialect.quote_ident(&pk.column);
            queries.push(StaticQuery {
                name: "first".to_string(),
                inputs: TokenStream::new(),
                returns: syn::parse_quote!(Option<gen::T>),
                sql: format!("{} ORDER BY {} LIMIT 1", select, pk_column),
                values: Vec::new(),
            });
            queries.push(StaticQuery {
                name: "last".to_string(),
                inputs: TokenStream::new(),
                returns: syn::parse_quote!(Option<gen::T>),
                sql: format!("{} ORDER BY {} DESC LIMIT 1", select, pk_column),
                values: Vec::new(),
            });
            queries.push(StaticQuery {
                name: "find_by_pk".to_string(),
                inputs: quote! { pk: #pk_type },
                returns: syn::parse_quote!(Option<gen::T>),
                sql: format!("{} WHERE {} = {}", select, pk_column, dialect.placeholder(1)),
                values: vec![quote! { ::sea_orm::Value::from(pk) }],
            });
            queries.push(StaticQuery {
                name: "delete_by_pk".to_string(),
                inputs: quote! { pk: #pk_type },
                returns: syn::parse_quote!(gen::RowsAffected),
                sql: format!("DELETE FROM {} WHERE {} = {}", table, pk_column, dialect.placeholder(1)),
                values: vec![quote! { ::sea_orm::Value::from(pk) }],
            });

            let updatable: Vec<&Field> = model.scalar_fields().filter(|field| field.name != pk.name).collect();
            if updatable.is_empty() {
                debug!("{} has no columns besides its primary key; no update_by_pk", model.model_name());
            } else {
                let set = assignments(
                    updatable.iter().map(|field| dialect.quote_ident(&field.column)),
                    dialect,
                    1,
                    ", ",
                );
                let mut values: Vec<TokenStream> = updatable.iter().map(|field| field_value(&row, field)).collect();
                values.push(field_value(&row, pk));
                queries.push(StaticQuery {
                    name: "update_by_pk".to_string(),
                    inputs: quote! { row: &#model_ident },
                    returns: syn::parse_quote!(gen::RowsAffected),
                    sql: format!(
                        "UPDATE {} SET {} WHERE {} = {}",
                        table,
                        set,
                        pk_column,
                        dialect.placeholder(updatable.len() + 1)
                    ),
                    values,
                });
            }
        }
        None => {
            debug!("{} has no primary key; only unordered built-ins", model.model_name());
            queries.push(StaticQuery {
                name: "first".to_string(),
                inputs: TokenStream::new(),
                returns: syn::parse_quote!(Option<gen::T>),
                sql: format!("{} LIMIT 1", select),
                values: Vec::new(),
            });
        }
    }

    queries
        .into_iter()
        .map(|query| query.into_unit(model, dialect, Origin::BuiltIn))
        .collect()
}
