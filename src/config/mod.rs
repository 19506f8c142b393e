pub mod schema;

pub use schema::{
    AgentsConfig, Config, PersistenceConfig, PersonaConfig, ProviderConfig, SessionsConfig,
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reexported_config_default_is_constructible() {
        let config = Config::default();

        assert!(!config.provider.name.is_empty());
        assert!(!config.agents.model.is_empty());
        assert!(config.provider.temperature > 0.0);
    }
}
