//! Storage key derivation: optional caller hook, optional cleaning, prefix.

use crate::{
    config::{AdapterConfig, KeyGenerator, KeyRequest},
    errors::{AdapterError, AdapterResult},
    models::CreateOptions,
};
use chrono::Utc;
use std::fmt;
use uuid::Uuid;

/// A filename resolved against the adapter configuration.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolvedKey {
    /// Key without the bucket prefix; what the host keeps.
    pub name: String,
    /// Full storage key, prefix included.
    pub key: String,
}

#[derive(Clone)]
pub struct KeyResolver {
    prefix: String,
    clean: bool,
    generator: Option<KeyGenerator>,
}

impl KeyResolver {
    pub fn new(config: &AdapterConfig) -> Self {
        Self {
            prefix: config.bucket_prefix.clone(),
            clean: config.clean_key,
            generator: config.generate_key.clone(),
        }
    }

    /// Resolve the key for a new object. Runs the key generator, if any,
    /// before cleaning; a failing generator aborts before any I/O.
    pub fn resolve_new(
        &self,
        filename: &str,
        content_type: Option<&str>,
        options: Option<&CreateOptions>,
    ) -> AdapterResult<ResolvedKey> {
        let name = match &self.generator {
            Some(generate) => {
                let request = KeyRequest {
                    filename,
                    content_type,
                    options,
                };
                generate(&request).map_err(|source| AdapterError::KeyGeneration {
                    filename: filename.to_string(),
                    source,
                })?
            }
            None => filename.to_string(),
        };
        self.finish(name)
    }

    /// Resolve the key of an object that was created earlier. `filename` is
    /// the `name` handed out by `create`, so the generator is not re-run.
    pub fn resolve_existing(&self, filename: &str) -> AdapterResult<ResolvedKey> {
        self.finish(filename.to_string())
    }

    fn finish(&self, name: String) -> AdapterResult<ResolvedKey> {
        let name = if self.clean {
            let cleaned = clean_key(&name);
            if cleaned.is_empty() {
                fallback_name()
            } else {
                cleaned
            }
        } else {
            name
        };

        if name.is_empty() {
            return Err(AdapterError::InvalidFilename(
                "resolved storage key is empty".to_string(),
            ));
        }

        Ok(ResolvedKey {
            key: format!("{}{}", self.prefix, name),
            name,
        })
    }
}

impl fmt::Debug for KeyResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("KeyResolver")
            .field("prefix", &self.prefix)
            .field("clean", &self.clean)
            .field("generator", &self.generator.as_ref().map(|_| "<fn>"))
            .finish()
    }
}

/// Rewrite `raw` into a key that is safe in URLs and object-store paths.
///
/// Letters, digits, `/`, `_`, `.`, `!`, `(`, `)` and `-` are kept. A few
/// symbols become words (`&` is `-and-`), whitespace runs and other ASCII
/// punctuation become a hyphen, and control or non-ASCII characters are
/// dropped. Hyphen runs collapse and leading or trailing `-`/`.` are
/// trimmed. Cleaning a clean key returns it unchanged.
pub fn clean_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for c in raw.chars() {
        match c {
            c if c.is_ascii_whitespace() => out.push('-'),
            c if !c.is_ascii() || c.is_ascii_control() => {}
            '&' => out.push_str("-and-"),
            '$' => out.push_str("-dollar-"),
            '@' => out.push_str("-at-"),
            '=' => out.push_str("-equals-"),
            '+' => out.push_str("-plus-"),
            c if c.is_ascii_alphanumeric() => out.push(c),
            '/' | '_' | '.' | '!' | '(' | ')' | '-' => out.push(c),
            _ => out.push('-'),
        }
    }

    let mut collapsed = String::with_capacity(out.len());
    for c in out.chars() {
        if c == '-' && collapsed.ends_with('-') {
            continue;
        }
        collapsed.push(c);
    }

    collapsed
        .trim_matches(|c| c == '-' || c == '.')
        .to_string()
}

/// Name used when cleaning leaves nothing, e.g. `file-1718000000000-3f2a9c1d`.
fn fallback_name() -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!("file-{}-{}", Utc::now().timestamp_millis(), &random[..8])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AdapterOptions;

    fn resolver(options: AdapterOptions) -> KeyResolver {
        let config = AdapterConfig::from_options_with_env(options, |_| None).unwrap();
        KeyResolver::new(&config)
    }

    #[test]
    fn cleans_symbols_whitespace_and_punctuation() {
        assert_eq!(clean_key("My File (1).png"), "My-File-(1).png");
        assert_eq!(clean_key("tom & jerry.txt"), "tom-and-jerry.txt");
        assert_eq!(clean_key("a+b=c@d$e"), "a-plus-b-equals-c-at-d-dollar-e");
        assert_eq!(clean_key("what?#[x]:y;z"), "what-x-y-z");
        assert_eq!(clean_key("  ..leading and trailing..  "), "leading-and-trailing");
        assert_eq!(clean_key("photos/2025/img.jpg"), "photos/2025/img.jpg");
    }

    #[test]
    fn drops_control_and_non_ascii() {
        assert_eq!(clean_key("caf\u{e9}\u{7}.txt"), "caf.txt");
        assert_eq!(clean_key("\u{1F600}"), "");
        assert_eq!(clean_key("a\t\n b"), "a-b");
    }

    #[test]
    fn cleaning_is_idempotent() {
        let inputs = [
            "My File (1).png",
            "tom & jerry.txt",
            "--a--b--",
            "&",
            "x @ y = z",
            "..hidden",
            "already-clean_name.txt",
            "dir name/sub dir/file+1.txt",
        ];
        for input in inputs {
            let once = clean_key(input);
            assert_eq!(clean_key(&once), once, "input {:?}", input);
        }
    }

    #[test]
    fn falls_back_when_nothing_survives_cleaning() {
        let keys = resolver(AdapterOptions::new("b").clean_key(true));
        let resolved = keys.resolve_new("\u{1F600}\u{1F600}", None, None).unwrap();
        assert!(resolved.name.starts_with("file-"), "{}", resolved.name);
        assert_eq!(resolved.name.split('-').count(), 3);
    }

    #[test]
    fn prepends_prefix_after_cleaning() {
        let keys = resolver(
            AdapterOptions::new("b")
                .bucket_prefix("uploads/")
                .clean_key(true),
        );
        let resolved = keys.resolve_new("my photo.png", None, None).unwrap();
        assert_eq!(resolved.name, "my-photo.png");
        assert_eq!(resolved.key, "uploads/my-photo.png");
    }

    #[test]
    fn leaves_names_alone_when_cleaning_is_off() {
        let keys = resolver(AdapterOptions::new("b").bucket_prefix("p/"));
        let resolved = keys.resolve_existing("my photo.png").unwrap();
        assert_eq!(resolved.key, "p/my photo.png");
    }

    #[test]
    fn generator_runs_only_for_new_objects() {
        let keys = resolver(AdapterOptions::new("b").generate_key(|request| {
            Ok(format!(
                "{}-{}",
                request.content_type.unwrap_or("none").replace('/', "_"),
                request.filename
            ))
        }));
        let created = keys
            .resolve_new("a.txt", Some("text/plain"), None)
            .unwrap();
        assert_eq!(created.name, "text_plain-a.txt");
        assert_eq!(keys.resolve_existing(&created.name).unwrap(), created);
    }

    #[test]
    fn generator_failure_is_reported() {
        let keys = resolver(
            AdapterOptions::new("b").generate_key(|_| Err("no keys today".into())),
        );
        let err = keys.resolve_new("a.txt", None, None).unwrap_err();
        assert!(matches!(err, AdapterError::KeyGeneration { ref filename, .. } if filename == "a.txt"));
        assert!(err.to_string().contains("no keys today"));
    }

    #[test]
    fn rejects_empty_keys() {
        let keys = resolver(AdapterOptions::new("b"));
        assert!(matches!(
            keys.resolve_existing(""),
            Err(AdapterError::InvalidFilename(_))
        ));
    }
}
