//! Starter catalog written by the seed operation

use crate::model::{ModelEntry, Provider};

fn starter(
    id: &str,
    name: &str,
    provider: Provider,
    model_id: &str,
    priority: i64,
    daily_limit: u64,
    enabled: bool,
) -> ModelEntry {
    let mut entry = ModelEntry::new(id, name, provider, model_id);
    entry.priority = priority;
    entry.daily_limit = daily_limit;
    entry.enabled = enabled;
    entry
}

/// The fixed starter catalog. Keys are left empty for an operator to fill in.
pub fn seed_catalog() -> Vec<ModelEntry> {
    vec![
        starter("groq-llama3", "Llama 3 (Groq)", Provider::Groq, "llama3-8b-8192", 1, 5000, true),
        starter(
            "gemini-pro",
            "Gemini 1.5 Flash",
            Provider::Gemini,
            "gemini-1.5-flash",
            2,
            1000,
            true,
        ),
        starter(
            "claude-sonnet",
            "Claude 3 Sonnet",
            Provider::Claude,
            "claude-3-sonnet-20240229",
            3,
            500,
            false,
        ),
        starter("openai-gpt4o", "GPT-4o", Provider::OpenAi, "gpt-4o", 4, 500, false),
        starter(
            "deepseek-chat",
            "DeepSeek Chat",
            Provider::DeepSeek,
            "deepseek-chat",
            2,
            2000,
            true,
        ),
        starter(
            "mistral-large",
            "Mistral Large",
            Provider::Mistral,
            "mistral-large-latest",
            3,
            1000,
            false,
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::HealthStatus;

    #[test]
    fn test_catalog_contents() {
        let catalog = seed_catalog();
        assert_eq!(catalog.len(), 6);

        let enabled: Vec<&str> = catalog
            .iter()
            .filter(|e| e.enabled)
            .map(|e| e.id.as_str())
            .collect();
        assert_eq!(enabled, vec!["groq-llama3", "gemini-pro", "deepseek-chat"]);

        for e in &catalog {
            assert!(e.api_keys.is_empty());
            assert_eq!(e.current_key_index, 0);
            assert_eq!(e.used_today, 0);
            assert_eq!(e.status, HealthStatus::Green);
        }

        let gemini = catalog.iter().find(|e| e.id == "gemini-pro").unwrap();
        assert_eq!(gemini.model_id, "gemini-1.5-flash");
        assert_eq!(gemini.priority, 2);
        assert_eq!(gemini.daily_limit, 1000);
    }

    #[test]
    fn test_ids_are_unique() {
        let catalog = seed_catalog();
        let mut ids: Vec<&str> = catalog.iter().map(|e| e.id.as_str()).collect();
        ids.sort();
        ids.dedup();
        assert_eq!(ids.len(), catalog.len());
    }
}
