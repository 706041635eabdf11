use super::Artifact;
use crate::naming::{self, ModelNames};
use crate::pipeline::Settings;
use heck::ToSnakeCase;
use proc_macro2::TokenStream;
use quote::{format_ident, quote};

/// File name of the namespace root
pub const NAMESPACE_FILE: &str = "gen.rs";

fn nullable() -> TokenStream {
    quote! {
        /// A value paired with a validity flag, for nullable columns that
        /// are not rendered as `Option`
        #[derive(Debug, Clone, Default, PartialEq, ::serde::Serialize, ::serde::Deserialize)]
        pub struct Nullable<T> {
            pub value: T,
            pub valid: bool,
        }

        impl<T> Nullable<T> {
            pub fn new(value: T) -> Self {
                Self { value, valid: true }
            }

            pub fn into_option(self) -> Option<T> {
                if self.valid {
                    Some(self.value)
                } else {
                    None
                }
            }
        }

        impl<T: Default> From<Option<T>> for Nullable<T> {
            fn from(value: Option<T>) -> Self {
                match value {
                    Some(value) => Self::new(value),
                    None => Self::default(),
                }
            }
        }

        impl<T> From<Nullable<T>> for ::sea_orm::Value
        where
            T: Into<::sea_orm::Value> + ::sea_orm::sea_query::Nullable,
        {
            fn from(value: Nullable<T>) -> Self {
                if value.valid {
                    value.value.into()
                } else {
                    T::null()
                }
            }
        }

        impl<T> ::sea_orm::TryGetable for Nullable<T>
        where
            T: ::sea_orm::TryGetable + Default,
        {
            fn try_get_by<I: ::sea_orm::ColIdx>(
                res: &::sea_orm::QueryResult,
                index: I,
            ) -> ::std::result::Result<Self, ::sea_orm::TryGetError> {
                Ok(<Option<T> as ::sea_orm::TryGetable>::try_get_by(res, index)?.into())
            }
        }
    }
}

/// Render `gen.rs`, the root every artifact hangs off.
///
/// The file is meant to be mounted with `#[path = "<out>/gen.rs"] mod gen;`;
/// artifact modules are declared relative to it. Models are listed in
/// module order whatever order they arrive in.
pub fn render_namespace_artifact(models: &[ModelNames], settings: &Settings) -> Artifact {
    let mut models: Vec<&ModelNames> = models.iter().collect();
    models.sort_by(|a, b| a.module_name.cmp(&b.module_name));
    models.dedup_by(|a, b| a.module_name == b.module_name);

    let modules: Vec<TokenStream> = models
        .iter()
        .map(|names| {
            let module = naming::ident(&names.module_name);
            let path = names.file_name();
            let mut tokens = quote! {
                #[path = #path]
                pub mod #module;
            };
            if settings.with_unit_test {
                let test_module = format_ident!("{}_test", names.module_name.trim_start_matches("r#"));
                let test_path = names.test_file_name();
                tokens.extend(quote! {
                    #[cfg(test)]
                    #[path = #test_path]
                    mod #test_module;
                });
            }
            tokens
        })
        .collect();

    let query = if settings.with_default_query {
        let accessors = models.iter().map(|names| {
            let module = naming::ident(&names.module_name);
            let do_ident = format_ident!("{}", names.do_name());
            let accessor = naming::ident(&names.model_name.to_snake_case());
            quote! {
                pub fn #accessor(&self) -> #module::#do_ident<'a, C> {
                    #module::#do_ident::new(self.db)
                }
            }
        });
        quote! {
            /// Entry point holding one query object per model
            pub struct Query<'a, C: ::sea_orm::ConnectionTrait> {
                db: &'a C,
            }

            impl<'a, C: ::sea_orm::ConnectionTrait> Query<'a, C> {
                pub fn new(db: &'a C) -> Self {
                    Self { db }
                }

                #( #accessors )*
            }

            pub fn use_db<C: ::sea_orm::ConnectionTrait>(db: &C) -> Query<'_, C> {
                Query::new(db)
            }
        }
    } else {
        TokenStream::new()
    };

    let nullable = nullable();
    let tokens = quote! {
        #( #modules )*

        #nullable

        #query
    };
    Artifact::new(NAMESPACE_FILE.to_string(), "gen".to_string(), tokens)
}
