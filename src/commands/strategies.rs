use crate::strategy::StrategyRegistry;

/// One line per registered strategy: name, declared parameters and description.
pub fn describe(registry: &StrategyRegistry) -> Vec<String> {
    registry
        .iter()
        .map(|strategy| {
            let parameters = strategy.parameter_names();
            let parameters = if parameters.is_empty() {
                "-".to_string()
            } else {
                parameters.join(", ")
            };
            format!(
                "{:<16} params: {:<20} {}",
                strategy.name(),
                parameters,
                strategy.description()
            )
        })
        .collect()
}

pub fn run(registry: &StrategyRegistry) {
    for line in describe(registry) {
        println!("{}", line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn lists_builtin_strategies() {
        let lines = describe(&StrategyRegistry::with_builtin());
        assert_eq!(lines.len(), 2);
        assert!(lines[0].starts_with("buy_and_hold"));
        assert!(lines[1].contains("short_ma, long_ma"));
    }
}
