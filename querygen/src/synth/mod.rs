//! Method synthesizer: binds a contract's template to a model and produces
//! a generation unit.

mod body;
pub(crate) mod signature;

use crate::contract::MethodContract;
use crate::error::TemplateError;
use crate::model::Model;
use crate::naming;
use crate::pipeline::Settings;
use crate::template::parse_template;
use body::{BodyBuilder, ParamInfo};
use log::debug;
use proc_macro2::TokenStream;
use quote::quote;
use signature::{classify, GenTypes, ReturnShape};
use syn::visit_mut::VisitMut;

/// Names the query object defines itself
const RESERVED_METHODS: &[&str] = &["new"];

/// Where a unit came from; later variants take precedence
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum Origin {
    BuiltIn,
    RelationDerived,
    UserTemplate,
}

/// One synthesized method, ready for emission.
///
/// Signature and body are rendered token text so units can cross thread
/// boundaries; emission parses them back.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GenerationUnit {
    pub model: String,
    pub name: String,
    pub origin: Origin,
    /// `async fn name(&self, ..) -> Ret`
    pub signature: String,
    /// The body block, braces included
    pub body: String,
    pub uses_where: bool,
    pub uses_set: bool,
}

impl GenerationUnit {
    /// Unit from token streams; used by the built-in generators
    pub fn new(model: &Model, name: &str, origin: Origin, signature: TokenStream, body: TokenStream) -> Self {
        Self {
            model: model.model_name().to_string(),
            name: name.to_string(),
            origin,
            signature: signature.to_string(),
            body: quote!({ #body }).to_string(),
            uses_where: false,
            uses_set: false,
        }
    }
}

/// Outcome of synthesizing one contract for one model
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Synthesis {
    Unit(GenerationUnit),
    /// The contract is marked `gen:skip`; nothing may be generated under this name
    Skipped { name: String },
}

/// Generated method name for a declared contract name
pub fn method_name(contract: &MethodContract, settings: &Settings) -> String {
    match &settings.method_name_strategy {
        Some(strategy) => strategy(&contract.name),
        None => naming::field_name(&contract.name),
    }
}

/// Bind `contract` to `model`.
///
/// A skip directive returns early without looking at the template. Every
/// `@@` path must resolve on the model (relation fields included), or the
/// whole method fails with [`TemplateError::UnboundFieldReference`].
pub fn synthesize(contract: &MethodContract, model: &Model, settings: &Settings) -> Result<Synthesis, TemplateError> {
    let name = method_name(contract, settings);
    if contract.skip {
        debug!("{}::{} is marked gen:skip", model.model_name(), name);
        return Ok(Synthesis::Skipped { name });
    }

    let invalid = |message: String| TemplateError::InvalidContract {
        method: name.clone(),
        message,
    };
    if !naming::is_valid_identifier(&name) || name != naming::sanitize_ident(&name) {
        return Err(invalid(format!("'{}' is not a usable method name", name)));
    }
    if RESERVED_METHODS.contains(&name.as_str()) {
        return Err(invalid(format!("'{}' is already defined on every query object", name)));
    }
    contract.validate()?;
    if contract.template.trim().is_empty() {
        return Err(invalid("the method has no query template".to_string()));
    }

    let ast = parse_template(&contract.template, &contract.param_names())?;
    for (path, _) in ast.field_paths() {
        if model.resolve_path(path).is_none() {
            return Err(TemplateError::UnboundFieldReference {
                method: name.clone(),
                model: model.model_name().to_string(),
                path: format!("@@{}", path.join(".")),
            });
        }
    }

    let model_ident = naming::ident(model.model_name());
    let mut params = Vec::with_capacity(contract.params.len());
    let mut inputs = Vec::with_capacity(contract.params.len());
    for param in &contract.params {
        let mut ty: syn::Type = syn::parse_str(&param.ty)
            .map_err(|err| invalid(format!("parameter type '{}': {}", param.ty, err)))?;
        let (kind, by_ref) = classify(&ty);
        GenTypes { model: &model_ident }.visit_type_mut(&mut ty);
        let pattern: TokenStream = param
            .pattern
            .parse()
            .map_err(|_| invalid(format!("parameter pattern '{}'", param.pattern)))?;
        inputs.push(quote! { #pattern: #ty });
        if let Some(param_name) = &param.name {
            params.push(ParamInfo {
                name: param_name.clone(),
                kind,
                by_ref,
            });
        }
    }

    let declared_return = contract
        .return_type
        .as_deref()
        .map(syn::parse_str::<syn::Type>)
        .transpose()
        .map_err(|err| invalid(format!("return type: {}", err)))?;
    let shape = ReturnShape::classify(declared_return.as_ref(), &model_ident);
    let output = match &declared_return {
        Some(ty) => {
            let mut ty = ty.clone();
            GenTypes { model: &model_ident }.visit_type_mut(&mut ty);
            quote! { -> #ty }
        }
        None => TokenStream::new(),
    };

    let lowered = BodyBuilder::new(settings.dialect, model, &params, &name).lower(&ast.fragments)?;
    let execution = signature::execution(&shape, settings.dialect, &name);
    let statements = lowered.statements;
    let method_ident = naming::ident(&name);

    debug!(
        "synthesized {}::{} from {} template fragment(s)",
        model.model_name(),
        name,
        ast.fragments.len()
    );

    Ok(Synthesis::Unit(GenerationUnit {
        model: model.model_name().to_string(),
        name: name.clone(),
        origin: Origin::UserTemplate,
        signature: quote! { async fn #method_ident(&self, #(#inputs),*) #output }.to_string(),
        body: quote! {{ #statements #execution }}.to_string(),
        uses_where: lowered.uses_where,
        uses_set: lowered.uses_set,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::contract::parse_interfaces;
    use crate::dialect::Dialect;
    use crate::schema::{build_model, BuildOptions, ColumnMeta, TableMeta};

    fn users() -> Model {
        let table = TableMeta {
            name: "users".to_string(),
            columns: vec![
                ColumnMeta::new("id", "bigint").primary_key(),
                ColumnMeta::new("name", "varchar(64)"),
                ColumnMeta::new("age", "int").nullable(),
            ],
            ..TableMeta::default()
        };
        let options = BuildOptions {
            generation: crate::model::GenerationOptions {
                nullable_as_pointer: true,
                ..Default::default()
            },
            ..BuildOptions::new(Dialect::MySql)
        };
        build_model(&table, &options).unwrap()
    }

    fn contract(source: &str) -> MethodContract {
        let trait_source = format!("trait Q {{ {} }}", source);
        parse_interfaces(&trait_source).unwrap().remove(0).methods.remove(0)
    }

    fn unit(synthesis: Synthesis) -> GenerationUnit {
        match synthesis {
            Synthesis::Unit(unit) => unit,
            other => panic!("expected a unit, got {:?}", other),
        }
    }

    #[test]
    fn test_synthesize_find_by_name() {
        let contract = self::contract(
            "/// SELECT * FROM @@table WHERE @@name = @name\nfn FindByName(name: &str) -> Result<Vec<gen::T>, sea_orm::DbErr>;",
        );
        let unit = unit(synthesize(&contract, &users(), &Settings::default()).unwrap());
        assert_eq!(unit.name, "find_by_name");
        assert_eq!(unit.origin, Origin::UserTemplate);
        assert!(unit.signature.contains("Result < Vec < User >"));
        assert!(unit.body.contains("SELECT * FROM `users` WHERE `name` = ?"));
        syn::parse_str::<syn::ItemFn>(&format!("{} {}", unit.signature, unit.body)).unwrap();
    }

    #[test]
    fn test_skip_returns_marker_without_validation() {
        let contract = self::contract("/// gen:skip\n/// SELECT @@nope\nfn SkipMethod(id: i64);");
        assert_eq!(
            synthesize(&contract, &users(), &Settings::default()).unwrap(),
            Synthesis::Skipped {
                name: "skip_method".to_string()
            }
        );
    }

    #[test]
    fn test_unbound_field_reference() {
        let contract = self::contract("/// SELECT * FROM @@table WHERE @@NonexistentField = 1\nfn Broken() -> gen::T;");
        let err = synthesize(&contract, &users(), &Settings::default()).unwrap_err();
        assert_eq!(
            err,
            TemplateError::UnboundFieldReference {
                method: "broken".to_string(),
                model: "User".to_string(),
                path: "@@NonexistentField".to_string(),
            }
        );
    }

    #[test]
    fn test_conditions_and_clauses() {
        let contract = self::contract(
            "/// SELECT * FROM @@table {{where}} {{if name != \"\"}} @@name = @name {{end}} {{if age != nil}} AND @@age > @min {{end}} {{end}}\n\
             fn Filter(name: String, age: Option<i32>, min: i32) -> Result<Vec<gen::T>, sea_orm::DbErr>;",
        );
        let settings = Settings {
            dialect: Dialect::Postgres,
            ..Settings::default()
        };
        let unit = unit(synthesize(&contract, &users(), &settings).unwrap());
        assert!(unit.uses_where);
        assert!(!unit.uses_set);
        assert!(unit.body.contains("where_clause"));
        assert!(unit.body.contains("\"${}\""));
        assert!(unit.body.contains("\\\"users\\\""));
        syn::parse_str::<syn::ItemFn>(&format!("{} {}", unit.signature, unit.body)).unwrap();
    }

    #[test]
    fn test_empty_slice_renders_null() {
        let contract = self::contract(
            "/// SELECT * FROM @@table WHERE @@id IN (@ids)\nfn FindByIds(ids: &[i64]) -> Result<Vec<gen::T>, sea_orm::DbErr>;",
        );
        let unit = unit(synthesize(&contract, &users(), &Settings::default()).unwrap());
        assert!(unit.body.contains("if ids . is_empty () { __sql . push_str (\"NULL\") ; }"), "{}", unit.body);
        assert!(unit.body.contains("for (__index , __item) in ids . iter () . enumerate ()"));
        syn::parse_str::<syn::ItemFn>(&format!("{} {}", unit.signature, unit.body)).unwrap();
    }

    #[test]
    fn test_model_param_fields() {
        let contract = self::contract(
            "/// UPDATE @@table {{set}} @@name = @user.name, {{end}} WHERE @@id = @user.id\nfn Save(user: &gen::T) -> Result<gen::RowsAffected, sea_orm::DbErr>;",
        );
        let unit = unit(synthesize(&contract, &users(), &Settings::default()).unwrap());
        assert!(unit.uses_set);
        assert!(unit.signature.contains("user : & User"));
        assert!(unit.signature.contains("Result < u64"));

        let contract = self::contract("/// UPDATE @@table SET @@name = @user.nick\nfn Save(user: &gen::T);");
        assert!(matches!(
            synthesize(&contract, &users(), &Settings::default()),
            Err(TemplateError::UnboundFieldReference { ref path, .. }) if path == "@user.nick"
        ));
    }

    #[test]
    fn test_invalid_bindings() {
        let contract = self::contract("/// SELECT * FROM @@table WHERE @@id = @user\nfn Bad(user: gen::T) -> gen::T;");
        assert!(matches!(
            synthesize(&contract, &users(), &Settings::default()),
            Err(TemplateError::InvalidContract { .. })
        ));

        let contract = self::contract("fn NoTemplate() -> gen::T;");
        assert!(matches!(
            synthesize(&contract, &users(), &Settings::default()),
            Err(TemplateError::InvalidContract { .. })
        ));

        let contract = self::contract("/// SELECT {{if}}\nfn Malformed() -> gen::T;");
        assert!(matches!(
            synthesize(&contract, &users(), &Settings::default()),
            Err(TemplateError::Malformed { .. })
        ));
    }
}
