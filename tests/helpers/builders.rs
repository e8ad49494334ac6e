use warden::authz::{Enforcer, Model};

/// Builder for enforcers with in-memory rules
pub struct EnforcerBuilder {
    model: String,
    policies: Vec<(String, Vec<String>)>,
    groupings: Vec<(String, Vec<String>)>,
}

impl EnforcerBuilder {
    pub fn new(model: &str) -> Self {
        Self {
            model: model.to_string(),
            policies: Vec::new(),
            groupings: Vec::new(),
        }
    }

    pub fn with_policy(self, fields: &[&str]) -> Self {
        self.with_named_policy("p", fields)
    }

    pub fn with_named_policy(mut self, ptype: &str, fields: &[&str]) -> Self {
        self.policies
            .push((ptype.to_string(), fields.iter().map(|f| f.to_string()).collect()));
        self
    }

    pub fn with_role(mut self, fields: &[&str]) -> Self {
        self.groupings
            .push(("g".to_string(), fields.iter().map(|f| f.to_string()).collect()));
        self
    }

    pub fn build(self) -> Enforcer {
        let model = Model::parse(&self.model).expect("Failed to parse model");
        let enforcer = Enforcer::new(model).expect("Failed to build enforcer");

        for (ptype, fields) in self.policies {
            enforcer
                .add_named_policy(&ptype, &fields)
                .expect("Failed to add policy");
        }
        for (gtype, fields) in self.groupings {
            enforcer
                .add_named_grouping_policy(&gtype, &fields)
                .expect("Failed to add grouping");
        }
        enforcer
    }
}
