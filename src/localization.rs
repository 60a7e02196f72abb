use fluent_bundle::concurrent::FluentBundle;
use fluent_bundle::{FluentArgs, FluentResource, FluentValue};
use std::collections::HashMap;
use std::sync::LazyLock;
use tracing::warn;
use unic_langid::LanguageIdentifier;

pub const DEFAULT_LANGUAGE: &str = "en";

const RESOURCES: &[(&str, &str)] = &[
    ("en", include_str!("../locales/en/main.ftl")),
    ("ru", include_str!("../locales/ru/main.ftl")),
];

/// Localization manager for the bot's user-facing text
pub struct LocalizationManager {
    bundles: HashMap<String, FluentBundle<FluentResource>>,
}

impl LocalizationManager {
    /// Create a manager with every compiled-in locale loaded
    pub fn new() -> Self {
        let bundles = RESOURCES
            .iter()
            .map(|(lang, source)| (lang.to_string(), Self::create_bundle(lang, source)))
            .collect();
        Self { bundles }
    }

    fn create_bundle(lang: &str, source: &str) -> FluentBundle<FluentResource> {
        let locale: LanguageIdentifier = lang.parse().unwrap_or_default();
        let mut bundle = FluentBundle::new_concurrent(vec![locale]);
        // Telegram renders isolation marks as visible garbage
        bundle.set_use_isolating(false);

        let resource = match FluentResource::try_new(source.to_string()) {
            Ok(resource) => resource,
            Err((resource, errors)) => {
                warn!(lang, errors = ?errors, "Fluent resource parsed with errors");
                resource
            }
        };
        if let Err(errors) = bundle.add_resource(resource) {
            warn!(lang, errors = ?errors, "Duplicate fluent messages");
        }
        bundle
    }

    /// Map a Telegram language code such as `ru-RU` to a loaded bundle name
    pub fn resolve_language<'a>(&self, language_code: Option<&'a str>) -> &'a str {
        let Some(code) = language_code else {
            return DEFAULT_LANGUAGE;
        };
        let primary = code.split(['-', '_']).next().unwrap_or(code);
        if self.bundles.contains_key(primary) {
            primary
        } else {
            DEFAULT_LANGUAGE
        }
    }

    /// Get a localized message in `lang`, falling back to English
    pub fn get_message_in_language(
        &self,
        key: &str,
        lang: &str,
        args: Option<&[(&str, &str)]>,
    ) -> String {
        let bundle = match self
            .bundles
            .get(lang)
            .or_else(|| self.bundles.get(DEFAULT_LANGUAGE))
        {
            Some(bundle) => bundle,
            None => return format!("Missing translation: {key}"),
        };

        let pattern = match bundle.get_message(key).and_then(|msg| msg.value()) {
            Some(pattern) => pattern,
            None => return format!("Missing translation: {key}"),
        };

        let fluent_args = args.map(|args| {
            let mut fluent_args = FluentArgs::new();
            for (name, value) in args {
                fluent_args.set(*name, FluentValue::from(*value));
            }
            fluent_args
        });

        let mut errors = vec![];
        let value = bundle.format_pattern(pattern, fluent_args.as_ref(), &mut errors);
        if !errors.is_empty() {
            warn!(key, lang, errors = ?errors, "Fluent formatting errors");
        }
        value.into_owned()
    }
}

impl Default for LocalizationManager {
    fn default() -> Self {
        Self::new()
    }
}

static LOCALIZATION_MANAGER: LazyLock<LocalizationManager> = LazyLock::new(LocalizationManager::new);

/// Get the global localization manager
pub fn get_localization_manager() -> &'static LocalizationManager {
    &LOCALIZATION_MANAGER
}

/// Localized message for the user's Telegram language code
pub fn t_lang(key: &str, language_code: Option<&str>) -> String {
    let manager = get_localization_manager();
    manager.get_message_in_language(key, manager.resolve_language(language_code), None)
}

/// Localized message with arguments for the user's Telegram language code
pub fn t_args_lang(key: &str, args: &[(&str, &str)], language_code: Option<&str>) -> String {
    let manager = get_localization_manager();
    manager.get_message_in_language(key, manager.resolve_language(language_code), Some(args))
}
