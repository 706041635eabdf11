//! Type-level view of a method: parameter kinds, the return shape and the
//! statement execution that produces it.

use crate::dialect::Dialect;
use proc_macro2::{Ident, TokenStream};
use quote::quote;
use syn::visit_mut::{self, VisitMut};
use syn::{GenericArgument, PathArguments, Type};

/// How a value behaves in conditions and bindings
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueKind {
    Str,
    Bool,
    Number { float: bool },
    /// `Vec<T>` or `&[T]`, expanded into a placeholder list
    Slice,
    Optional(Box<ValueKind>),
    /// The `Nullable<T>` value/valid pair
    Nullable(Box<ValueKind>),
    /// The bound model, `gen::T`
    Model,
    Other,
}

/// Classify a type as written; `gen::T` classifies as [`ValueKind::Model`].
/// The flag tells whether the value is reached through a reference.
pub fn classify(ty: &Type) -> (ValueKind, bool) {
    match ty {
        Type::Reference(reference) => (classify(&reference.elem).0, true),
        Type::Slice(_) => (ValueKind::Slice, false),
        Type::Paren(paren) => classify(&paren.elem),
        Type::Path(type_path) if is_gen_path(type_path, "T") => (ValueKind::Model, false),
        Type::Path(type_path) => {
            let Some(segment) = type_path.path.segments.last() else {
                return (ValueKind::Other, false);
            };
            let kind = match segment.ident.to_string().as_str() {
                "String" | "str" => ValueKind::Str,
                "bool" => ValueKind::Bool,
                "i8" | "i16" | "i32" | "i64" | "i128" | "isize" | "u8" | "u16" | "u32" | "u64" | "u128"
                | "usize" => ValueKind::Number { float: false },
                "f32" | "f64" => ValueKind::Number { float: true },
                "Vec" => match generic_arg(segment) {
                    Some(inner) if is_named(inner, "u8") => ValueKind::Other,
                    _ => ValueKind::Slice,
                },
                "Option" => match generic_arg(segment) {
                    Some(inner) => ValueKind::Optional(Box::new(classify(inner).0)),
                    None => ValueKind::Other,
                },
                "Nullable" => match generic_arg(segment) {
                    Some(inner) => ValueKind::Nullable(Box::new(classify(inner).0)),
                    None => ValueKind::Other,
                },
                _ => ValueKind::Other,
            };
            (kind, false)
        }
        _ => (ValueKind::Other, false),
    }
}

fn generic_arg(segment: &syn::PathSegment) -> Option<&Type> {
    let PathArguments::AngleBracketed(args) = &segment.arguments else {
        return None;
    };
    args.args.iter().find_map(|arg| match arg {
        GenericArgument::Type(ty) => Some(ty),
        _ => None,
    })
}

fn is_named(ty: &Type, name: &str) -> bool {
    matches!(ty, Type::Path(type_path) if type_path.path.is_ident(name))
}

fn is_gen_path(type_path: &syn::TypePath, name: &str) -> bool {
    let segments = &type_path.path.segments;
    type_path.qself.is_none() && segments.len() == 2 && segments[0].ident == "gen" && segments[1].ident == name
}

/// Replaces `gen::T` with the model type and `gen::RowsAffected` with `u64`
pub struct GenTypes<'a> {
    pub model: &'a Ident,
}

impl VisitMut for GenTypes<'_> {
    fn visit_type_mut(&mut self, ty: &mut Type) {
        if let Type::Path(type_path) = ty {
            if is_gen_path(type_path, "T") {
                let model = self.model;
                *ty = syn::parse_quote!(#model);
                return;
            }
            if is_gen_path(type_path, "RowsAffected") {
                *ty = syn::parse_quote!(u64);
                return;
            }
        }
        visit_mut::visit_type_mut(self, ty);
    }
}

/// A row decoded from a query
#[derive(Debug, Clone)]
pub enum Row {
    /// Decoded with `FromQueryResult`
    Model(Type),
    /// Decoded from column 0
    Scalar(Type),
}

/// What the statement execution produces
#[derive(Debug, Clone)]
pub enum Fetch {
    /// Executed, result discarded
    Exec,
    /// Executed, rows affected returned
    Rows,
    /// Exactly one row, missing row is an error
    One(Row),
    Optional(Row),
    Many(Row),
}

/// Return shape of a method
#[derive(Debug, Clone)]
pub struct ReturnShape {
    /// `Result<T, E>`; plain `T` swallows errors into `T::default()`
    pub fallible: bool,
    pub fetch: Fetch,
    /// Success type after `gen` substitution
    pub ok_type: Type,
}

const SCALARS: &[&str] = &[
    "i8", "i16", "i32", "i64", "u8", "u16", "u32", "u64", "f32", "f64", "bool", "String", "NaiveDate",
    "NaiveTime", "NaiveDateTime", "DateTime", "Uuid", "Value", "Decimal",
];

fn row(ty: &Type, model: &Ident) -> Row {
    let scalar = match ty {
        Type::Path(type_path) => type_path.path.segments.last().is_some_and(|segment| {
            let name = segment.ident.to_string();
            SCALARS.contains(&name.as_str())
                || (name == "Vec" && generic_arg(segment).is_some_and(|inner| is_named(inner, "u8")))
        }),
        _ => false,
    };
    let mut substituted = ty.clone();
    GenTypes { model }.visit_type_mut(&mut substituted);
    if scalar {
        Row::Scalar(substituted)
    } else {
        Row::Model(substituted)
    }
}

impl ReturnShape {
    /// Classify a declared return type, `None` meaning `()`
    pub fn classify(ty: Option<&Type>, model: &Ident) -> Self {
        let Some(ty) = ty else {
            return ReturnShape {
                fallible: false,
                fetch: Fetch::Exec,
                ok_type: syn::parse_quote!(()),
            };
        };

        let (fallible, inner) = match ty {
            Type::Path(type_path) => match type_path.path.segments.last() {
                Some(segment) if segment.ident == "Result" => match generic_arg(segment) {
                    Some(inner) => (true, inner),
                    None => (false, ty),
                },
                _ => (false, ty),
            },
            _ => (false, ty),
        };

        let fetch = match inner {
            Type::Tuple(tuple) if tuple.elems.is_empty() => Fetch::Exec,
            Type::Path(type_path) if is_gen_path(type_path, "RowsAffected") => Fetch::Rows,
            Type::Path(type_path) => {
                let segment = type_path.path.segments.last();
                let name = segment.map(|segment| segment.ident.to_string()).unwrap_or_default();
                match (name.as_str(), segment.and_then(generic_arg)) {
                    ("Option", Some(arg)) => Fetch::Optional(row(arg, model)),
                    ("Vec", Some(arg)) if !is_named(arg, "u8") => Fetch::Many(row(arg, model)),
                    _ => Fetch::One(row(inner, model)),
                }
            }
            _ => Fetch::One(row(inner, model)),
        };

        let mut ok_type = inner.clone();
        GenTypes { model }.visit_type_mut(&mut ok_type);
        ReturnShape {
            fallible,
            fetch,
            ok_type,
        }
    }
}

/// Statements turning `__sql` and `__values` into the method's return value
pub fn execution(shape: &ReturnShape, dialect: Dialect, method: &str) -> TokenStream {
    let backend = dialect.backend_tokens();
    let ok_type = &shape.ok_type;
    let not_found = format!("{} returned no rows", method);

    let fetch = match &shape.fetch {
        Fetch::Exec => quote! {
            self.db.execute(__stmt).await.map(|_| ())
        },
        Fetch::Rows => quote! {
            self.db.execute(__stmt).await.map(|__res| __res.rows_affected())
        },
        Fetch::One(Row::Model(ty)) => quote! {
            <#ty as ::sea_orm::FromQueryResult>::find_by_statement(__stmt)
                .one(self.db)
                .await?
                .ok_or_else(|| ::sea_orm::DbErr::RecordNotFound(#not_found.to_owned()))
        },
        Fetch::Optional(Row::Model(ty)) => quote! {
            <#ty as ::sea_orm::FromQueryResult>::find_by_statement(__stmt).one(self.db).await
        },
        Fetch::Many(Row::Model(ty)) => quote! {
            <#ty as ::sea_orm::FromQueryResult>::find_by_statement(__stmt).all(self.db).await
        },
        Fetch::One(Row::Scalar(ty)) => quote! {
            let __row = self
                .db
                .query_one(__stmt)
                .await?
                .ok_or_else(|| ::sea_orm::DbErr::RecordNotFound(#not_found.to_owned()))?;
            __row.try_get_by_index::<#ty>(0)
        },
        Fetch::Optional(Row::Scalar(ty)) => quote! {
            match self.db.query_one(__stmt).await? {
                Some(__row) => __row.try_get_by_index::<#ty>(0).map(Some),
                None => Ok(None),
            }
        },
        Fetch::Many(Row::Scalar(ty)) => quote! {
            self.db
                .query_all(__stmt)
                .await?
                .iter()
                .map(|__row| __row.try_get_by_index::<#ty>(0))
                .collect::<::std::result::Result<Vec<#ty>, ::sea_orm::DbErr>>()
        },
    };

    let finish = if shape.fallible {
        quote! { __outcome.map_err(::core::convert::Into::into) }
    } else {
        quote! { __outcome.unwrap_or_default() }
    };

    quote! {
        let __stmt = ::sea_orm::Statement::from_sql_and_values(#backend, __sql, __values);
        let __outcome: ::std::result::Result<#ok_type, ::sea_orm::DbErr> = async { #fetch }.await;
        #finish
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use quote::format_ident;

    fn ty(src: &str) -> Type {
        syn::parse_str(src).unwrap()
    }

    #[test]
    fn test_classify_params() {
        assert_eq!(classify(&ty("&str")), (ValueKind::Str, true));
        assert_eq!(classify(&ty("Vec<i64>")), (ValueKind::Slice, false));
        assert_eq!(classify(&ty("&[i64]")), (ValueKind::Slice, true));
        assert_eq!(classify(&ty("Vec<u8>")), (ValueKind::Other, false));
        assert_eq!(
            classify(&ty("Option<f64>")),
            (ValueKind::Optional(Box::new(ValueKind::Number { float: true })), false)
        );
        assert_eq!(classify(&ty("&gen::T")), (ValueKind::Model, true));
        assert_eq!(
            classify(&ty("super::Nullable<String>")),
            (ValueKind::Nullable(Box::new(ValueKind::Str)), false)
        );
    }

    #[test]
    fn test_gen_substitution() {
        let model = format_ident!("User");
        let mut ty = ty("Result<Vec<gen::T>, MyError<gen::T>>");
        GenTypes { model: &model }.visit_type_mut(&mut ty);
        assert_eq!(
            quote!(#ty).to_string(),
            quote!(Result<Vec<User>, MyError<User>>).to_string()
        );
    }

    #[test]
    fn test_return_shapes() {
        let model = format_ident!("User");
        let shape = ReturnShape::classify(Some(&ty("Result<Vec<gen::T>, DbErr>")), &model);
        assert!(shape.fallible);
        assert!(matches!(shape.fetch, Fetch::Many(Row::Model(_))));

        let shape = ReturnShape::classify(Some(&ty("gen::T")), &model);
        assert!(!shape.fallible);
        assert!(matches!(shape.fetch, Fetch::One(Row::Model(_))));

        let shape = ReturnShape::classify(Some(&ty("Result<Option<i64>, DbErr>")), &model);
        assert!(matches!(shape.fetch, Fetch::Optional(Row::Scalar(_))));

        let shape = ReturnShape::classify(Some(&ty("Result<gen::RowsAffected, DbErr>")), &model);
        assert!(matches!(shape.fetch, Fetch::Rows));
        let ok = &shape.ok_type;
        assert_eq!(quote!(#ok).to_string(), "u64");

        let shape = ReturnShape::classify(Some(&ty("Result<(), DbErr>")), &model);
        assert!(matches!(shape.fetch, Fetch::Exec));
        assert!(matches!(ReturnShape::classify(None, &model).fetch, Fetch::Exec));

        let shape = ReturnShape::classify(Some(&ty("Result<Vec<u8>, DbErr>")), &model);
        assert!(matches!(shape.fetch, Fetch::One(Row::Scalar(_))));
    }
}
