//! Recommendation engine: decide whether to suggest a different locale.
//!
//! A suggestion is only ever made to a first-time, undecided visitor: no
//! language in the URL, nothing stored, and no earlier refusal. The suggested
//! locale comes from geolocation alone, falling back to the fallback language
//! for unsupported countries.

use crate::i18n::{LanguageCatalog, LanguageCode};
use crate::location::LocationInfo;
use crate::resolver::{detect_language_from_path, ResolutionContext, ResolvedLanguage};
use crate::storage::PersistedPreference;
use serde::Serialize;
use std::time::Duration;

/// How long the presentation layer keeps the prompt on screen
pub const AUTO_DISMISS_AFTER: Duration = Duration::from_secs(10);

/// What the presentation layer needs to render a switch prompt
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RecommendationPayload {
    pub target_code: LanguageCode,
    pub display_name: &'static str,
    pub flag: &'static str,
    /// Country the suggestion is based on, as reported by geolocation
    pub country_code: String,
    /// No locale serves the country; the target is the fallback language
    pub is_unknown_region: bool,
}

impl RecommendationPayload {
    pub fn auto_dismiss_after(&self) -> Duration {
        AUTO_DISMISS_AFTER
    }
}

/// Whether an unsolicited switch suggestion may be shown.
///
/// `ctx` must hold the stored preference as it was before this visit wrote
/// anything, so a first visit still counts as undecided.
pub fn should_recommend(
    ctx: &ResolutionContext,
    previously_declined: bool,
    catalog: &LanguageCatalog,
) -> bool {
    if previously_declined
        || ctx.has_stored_preference()
        || detect_language_from_path(&ctx.url_path, catalog).is_some()
    {
        return false;
    }

    let Some(country) = ctx.location.country() else {
        return false;
    };

    match catalog.entries_by_region(country) {
        Some(entry) => entry.code != ctx.default_language.code(),
        None => ctx.fallback_language != ctx.default_language,
    }
}

/// Build the prompt contents, or `None` when the visitor already sees the
/// locale geolocation would suggest.
pub fn build_recommendation_payload(
    resolved: &ResolvedLanguage,
    location: &LocationInfo,
    fallback_language: LanguageCode,
    catalog: &LanguageCatalog,
) -> Option<RecommendationPayload> {
    let country = location.country()?;

    let (entry, is_unknown_region) = match catalog.entries_by_region(country) {
        Some(entry) => (entry, false),
        None => (fallback_language.entry(catalog)?, true),
    };

    if entry.code == resolved.code.code() {
        return None;
    }

    Some(RecommendationPayload {
        target_code: LanguageCode::from_entry(entry),
        display_name: entry.display_name,
        flag: entry.flag,
        country_code: country.to_ascii_uppercase(),
        is_unknown_region,
    })
}

/// The visitor accepted a switch to `target`.
pub fn on_accept(current: &PersistedPreference, target: LanguageCode) -> PersistedPreference {
    PersistedPreference {
        language_code: Some(target),
        ..current.clone()
    }
}

/// The visitor refused the suggestion; never suggest again.
pub fn on_decline(current: &PersistedPreference) -> PersistedPreference {
    PersistedPreference {
        declined_recommendation: true,
        ..current.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::i18n::LanguageEntry;
    use crate::resolver::{resolve, Provenance};
    use proptest::prelude::*;

    // ==================== Helper Functions ====================

    fn code(value: &str) -> LanguageCode {
        LanguageCode::from_code(LanguageCatalog::get(), value).unwrap()
    }

    fn first_visit(country: Option<&str>) -> ResolutionContext {
        let ctx = ResolutionContext::new(code("ja"), code("en"));
        match country {
            Some(country) => ctx.with_location(LocationInfo::from_country(country)),
            None => ctx,
        }
    }

    // ==================== should_recommend Tests ====================

    #[test]
    fn test_recommend_for_supported_foreign_country() {
        assert!(should_recommend(&first_visit(Some("BR")), false, LanguageCatalog::get()));
    }

    #[test]
    fn test_no_recommendation_for_default_language_country() {
        assert!(!should_recommend(&first_visit(Some("JP")), false, LanguageCatalog::get()));
    }

    #[test]
    fn test_recommend_for_unknown_region_when_fallback_differs() {
        assert!(should_recommend(&first_visit(Some("DE")), false, LanguageCatalog::get()));
    }

    #[test]
    fn test_no_recommendation_for_unknown_region_when_fallback_is_default() {
        let ctx = ResolutionContext::new(code("en"), code("en"))
            .with_location(LocationInfo::from_country("DE"));
        assert!(!should_recommend(&ctx, false, LanguageCatalog::get()));
    }

    #[test]
    fn test_no_recommendation_without_country() {
        assert!(!should_recommend(&first_visit(None), false, LanguageCatalog::get()));
        let ip_only = first_visit(None).with_location(LocationInfo::ip_only("192.0.2.1"));
        assert!(!should_recommend(&ip_only, false, LanguageCatalog::get()));
    }

    #[test]
    fn test_path_signal_opts_out() {
        let ctx = first_visit(Some("BR")).with_path("/ja/index.html");
        assert!(!should_recommend(&ctx, false, LanguageCatalog::get()));
    }

    #[test]
    fn test_stored_preference_opts_out_even_if_unsupported() {
        let ctx = first_visit(Some("BR")).with_stored_preference(Some("klingon".to_string()));
        assert!(!should_recommend(&ctx, false, LanguageCatalog::get()));
    }

    #[test]
    fn test_decline_opts_out() {
        assert!(!should_recommend(&first_visit(Some("BR")), true, LanguageCatalog::get()));
    }

    proptest! {
        #[test]
        fn prop_declined_never_recommends(
            country in proptest::option::of("[A-Za-z]{2}"),
            path in "(/[a-zA-Z-]{0,5}){0,3}",
            stored in proptest::option::of("[a-z]{0,3}"),
        ) {
            let ctx = first_visit(country.as_deref())
                .with_path(path)
                .with_stored_preference(stored);
            prop_assert!(!should_recommend(&ctx, true, LanguageCatalog::get()));
        }
    }

    // ==================== Payload Tests ====================

    #[test]
    fn test_payload_for_geo_language() {
        let location = LocationInfo::from_country("br");
        let shown = ResolvedLanguage::new(code("ja"), Provenance::Default);

        let payload =
            build_recommendation_payload(&shown, &location, code("en"), LanguageCatalog::get())
                .expect("Should recommend");
        assert_eq!(payload.target_code, "pt");
        assert_eq!(payload.display_name, "Português");
        assert_eq!(payload.country_code, "BR");
        assert!(!payload.is_unknown_region);
        assert_eq!(payload.auto_dismiss_after(), Duration::from_secs(10));
    }

    #[test]
    fn test_payload_for_unknown_region() {
        let location = LocationInfo::from_country("DE");
        let shown = ResolvedLanguage::new(code("ja"), Provenance::Path);

        let payload =
            build_recommendation_payload(&shown, &location, code("en"), LanguageCatalog::get())
                .expect("Should recommend");
        assert_eq!(payload.target_code, "en");
        assert!(payload.is_unknown_region);
    }

    #[test]
    fn test_no_payload_when_already_in_recommended_language() {
        let ctx = first_visit(Some("BR"));
        let resolved = resolve(&ctx, LanguageCatalog::get());
        assert_eq!(resolved.code, "pt");

        assert_eq!(
            build_recommendation_payload(
                &resolved,
                &ctx.location,
                code("en"),
                LanguageCatalog::get()
            ),
            None
        );
    }

    #[test]
    fn test_no_payload_without_country() {
        let shown = ResolvedLanguage::new(code("ja"), Provenance::Default);
        assert_eq!(
            build_recommendation_payload(
                &shown,
                &LocationInfo::default(),
                code("en"),
                LanguageCatalog::get()
            ),
            None
        );
    }

    #[test]
    fn test_no_payload_when_fallback_missing_from_catalog() {
        let catalog = LanguageCatalog::new(vec![LanguageEntry {
            code: "ja",
            display_name: "日本語",
            flag: "",
            region_codes: &["JP"],
        }])
        .unwrap();
        let shown = ResolvedLanguage::new(code("ja"), Provenance::Default);

        let location = LocationInfo::from_country("DE");

        // "en" is valid in the site catalog but not in this one
        assert_eq!(
            build_recommendation_payload(&shown, &location, code("en"), &catalog),
            None
        );
    }

    #[test]
    fn test_payload_serialization() {
        let shown = ResolvedLanguage::new(code("ja"), Provenance::Default);
        let payload = build_recommendation_payload(
            &shown,
            &LocationInfo::from_country("MX"),
            code("en"),
            LanguageCatalog::get(),
        )
        .unwrap();

        let json = serde_json::to_value(&payload).unwrap();
        assert_eq!(json["target_code"], "es");
        assert_eq!(json["is_unknown_region"], false);
    }

    // ==================== Accept / Decline Tests ====================

    #[test]
    fn test_on_accept_sets_language_keeps_decline_flag() {
        let current = PersistedPreference {
            language_code: Some(code("ja")),
            declined_recommendation: true,
            last_visit: None,
        };

        let updated = on_accept(&current, code("pt"));
        assert_eq!(updated.language_code, Some(code("pt")));
        assert!(updated.declined_recommendation);
    }

    #[test]
    fn test_on_decline_sets_flag_only() {
        let current = PersistedPreference {
            language_code: Some(code("ja")),
            ..PersistedPreference::default()
        };

        let updated = on_decline(&current);
        assert!(updated.declined_recommendation);
        assert_eq!(updated.language_code, Some(code("ja")));
    }

    #[test]
    fn test_decline_then_should_recommend_is_false() {
        let ctx = first_visit(Some("BR"));
        assert!(should_recommend(&ctx, false, LanguageCatalog::get()));

        let declined = on_decline(&PersistedPreference::default());
        assert!(!should_recommend(
            &ctx,
            declined.declined_recommendation,
            LanguageCatalog::get()
        ));
    }
}
