//! Per-host query augmentation.

use std::collections::HashMap;

use regex::Regex;
use url::Url;

use crate::config::QueryParamRule;
use crate::proxy::target::host_and_port;

#[derive(Debug)]
struct CompiledRule {
    pattern: Regex,
    params: Vec<(String, String)>,
}

/// Appends configured parameters to target URLs whose host and full URL match.
#[derive(Debug, Default)]
pub struct QueryAugmenter {
    rules: HashMap<String, Vec<CompiledRule>>,
}

impl QueryAugmenter {
    /// Compile the configured rules. Keys are host names, optionally with a port.
    pub fn from_config(config: &HashMap<String, Vec<QueryParamRule>>) -> Result<Self, regex::Error> {
        let mut rules = HashMap::with_capacity(config.len());
        for (host, host_rules) in config {
            let compiled = host_rules
                .iter()
                .map(|rule| {
                    Ok(CompiledRule {
                        pattern: Regex::new(&rule.regex_pattern)?,
                        params: rule
                            .params
                            .iter()
                            .map(|(k, v)| (k.clone(), v.clone()))
                            .collect(),
                    })
                })
                .collect::<Result<Vec<_>, regex::Error>>()?;
            rules.insert(host.to_ascii_lowercase(), compiled);
        }
        Ok(Self { rules })
    }

    /// Append the parameters of every matching rule, in configured order.
    ///
    /// Patterns are tested against the URL as it was before augmentation.
    /// Returns the number of rules applied.
    pub fn apply(&self, url: &mut Url) -> usize {
        let original = url.as_str().to_string();
        let mut keys = Vec::with_capacity(2);
        if let Some(host) = url.host_str() {
            keys.push(host.to_ascii_lowercase());
        }
        if url.port().is_some() {
            if let Some(authority) = host_and_port(url) {
                keys.push(authority.to_ascii_lowercase());
            }
        }

        let mut applied = 0;
        for key in keys {
            let Some(rules) = self.rules.get(&key) else { continue };
            for rule in rules
                .iter()
                .filter(|r| !r.params.is_empty() && r.pattern.is_match(&original))
            {
                let mut pairs = url.query_pairs_mut();
                for (name, value) in &rule.params {
                    pairs.append_pair(name, value);
                }
                applied += 1;
            }
        }
        applied
    }
}
