use miette::Diagnostic;
use thiserror::Error;

#[derive(Debug, Error, Diagnostic)]
pub enum AuthzError {
    #[error("Invalid model: {0}")]
    #[diagnostic(
        code(warden::authz::model_parse),
        help("A model needs `r`, at least one `p`, `e` and `m` sections written as `key = value` lines")
    )]
    ModelParse(String),

    #[error("Invalid matcher expression: {0}")]
    #[diagnostic(
        code(warden::authz::invalid_matcher),
        help("Supported operators: ==, !=, &&, ||, !, in. Fields are addressed as r.<name> / p.<name>; role checks as g(...)")
    )]
    InvalidMatcher(String),

    #[error("Matcher evaluation failed: {0}")]
    #[diagnostic(code(warden::authz::eval))]
    Eval(String),

    #[error("Unsupported policy effect `{0}`")]
    #[diagnostic(
        code(warden::authz::invalid_effect),
        help("Use some(where (p.eft == allow)), !some(where (p.eft == deny)), their conjunction, or priority(p.eft), optionally followed by `|| allow` / `|| deny`")
    )]
    InvalidEffect(String),

    #[error("Request has {actual} values but the request definition declares {expected}")]
    #[diagnostic(code(warden::authz::request_arity))]
    RequestArity { expected: usize, actual: usize },

    #[error("Rule `{ptype}` has {actual} fields but its definition declares {expected}")]
    #[diagnostic(code(warden::authz::rule_arity))]
    RuleArity {
        ptype: String,
        expected: usize,
        actual: usize,
    },

    #[error("Undefined policy type `{0}`")]
    #[diagnostic(
        code(warden::authz::unknown_ptype),
        help("Declare it in the model, e.g. `p2 = sub, obj, act` or `g2 = _, _`")
    )]
    UnknownPolicyType(String),

    #[error("Rule `{ptype}` field {index} contains a line break")]
    #[diagnostic(
        code(warden::authz::invalid_field),
        help("Rule fields are stored one rule per line; remove `\\r` and `\\n` from the value")
    )]
    InvalidField { ptype: String, index: usize },

    #[error("Invalid effect `{0}` on rule (expected `allow` or `deny`)")]
    #[diagnostic(code(warden::authz::invalid_effect_value))]
    InvalidEffectValue(String),

    #[error("Malformed policy row {row}: {message}")]
    #[diagnostic(
        code(warden::authz::malformed_row),
        help("Each row is `ptype, field1, field2, ...`; quote fields that contain commas")
    )]
    MalformedRow { row: usize, message: String },

    #[error("Failed to access policy storage `{path}`")]
    #[diagnostic(
        code(warden::authz::storage),
        help("Check that the file exists and that the process may read and write it")
    )]
    Storage {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("Database error: {0}")]
    #[diagnostic(code(warden::authz::db))]
    Database(#[from] sea_orm::DbErr),

    #[error("No persistence adapter configured")]
    #[diagnostic(
        code(warden::authz::no_adapter),
        help("Build the enforcer with Enforcer::with_adapter to load or save policy")
    )]
    NoAdapter,
}

pub type AuthzResult<T> = Result<T, AuthzError>;
