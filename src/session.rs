//! One visit: locate, resolve, persist, and handle the visitor's choices.
//!
//! [`LanguageSession`] owns no global state. Everything it learns about the
//! visit is captured in an immutable [`ResolutionContext`] when the session
//! starts; later actions (switch, accept, decline, reset) only write to the
//! preference store and return plain data for the presentation layer.

use crate::config::Config;
use crate::error::Result;
use crate::i18n::{LanguageCatalog, LanguageCode};
use crate::location::{LocationInfo, LocationProvider};
use crate::navigation::{build_language_url, NavigationRequest, SiteAddress};
use crate::recommender::{
    build_recommendation_payload, on_accept, on_decline, should_recommend, RecommendationPayload,
};
use crate::resolver::{detect_language_from_path, resolve, ResolutionContext, ResolvedLanguage};
use crate::storage::{PreferenceStore, Preferences, StorageKeys};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, info, warn};

/// Per-visit inputs that do not come from storage or geolocation
#[derive(Debug, Clone, Default)]
pub struct VisitRequest {
    pub url_path: String,
    pub client_language: Option<String>,
}

impl VisitRequest {
    pub fn new(url_path: impl Into<String>) -> Self {
        Self {
            url_path: url_path.into(),
            client_language: None,
        }
    }

    pub fn with_client_language(mut self, tag: Option<String>) -> Self {
        self.client_language = tag;
        self
    }
}

/// Read-only diagnostic view of the switcher state
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DebugSnapshot {
    /// Language of this session, when one was resolved
    pub resolved: Option<ResolvedLanguage>,
    /// Stored language, or the default when nothing valid is stored
    pub current_language: LanguageCode,
    pub location: Option<LocationInfo>,
    pub browser_language: Option<String>,
    pub last_visit: Option<DateTime<Utc>>,
    pub recommendation_declined: bool,
    /// What geolocation would suggest for the cached location
    pub recommended_language: Option<LanguageCode>,
}

/// Build a snapshot straight from storage, without resolving a visit
pub fn debug_snapshot<S: PreferenceStore>(
    preferences: &Preferences<S>,
    catalog: &LanguageCatalog,
    default_language: LanguageCode,
    fallback_language: LanguageCode,
    browser_language: Option<String>,
) -> Result<DebugSnapshot> {
    let stored = preferences.load(catalog)?;
    let location = preferences.cached_location()?;
    let recommended_language = location.as_ref().and_then(|loc| loc.country()).map(|country| {
        catalog
            .entries_by_region(country)
            .map(LanguageCode::from_entry)
            .unwrap_or(fallback_language)
    });

    Ok(DebugSnapshot {
        resolved: None,
        current_language: stored.language_code.unwrap_or(default_language),
        location,
        browser_language,
        last_visit: stored.last_visit,
        recommendation_declined: stored.declined_recommendation,
        recommended_language,
    })
}

/// State of one visit
#[derive(Debug)]
pub struct LanguageSession<S: PreferenceStore> {
    catalog: LanguageCatalog,
    preferences: Preferences<S>,
    site: SiteAddress,
    context: ResolutionContext,
    resolved: ResolvedLanguage,
    declined: bool,
}

impl<S: PreferenceStore> LanguageSession<S> {
    /// Locate the visitor, then resolve and persist as [`Self::from_location`] does
    pub async fn start<L: LocationProvider>(
        config: &Config,
        catalog: LanguageCatalog,
        store: S,
        provider: &L,
        visit: VisitRequest,
    ) -> Result<Self> {
        let location = provider.locate().await;
        Self::from_location(config, catalog, store, location, visit)
    }

    /// Resolve the visit for an already known location and record it.
    ///
    /// Fails only on configuration that names languages missing from
    /// `catalog`. Storage problems are logged and the visit still resolves.
    pub fn from_location(
        config: &Config,
        catalog: LanguageCatalog,
        store: S,
        location: LocationInfo,
        visit: VisitRequest,
    ) -> Result<Self> {
        let session = Self::resume(config, catalog, store, location, visit)?;
        info!(
            "Final language selection: {} ({})",
            session.resolved.code, session.resolved.provenance
        );
        session.record_visit(Utc::now());
        Ok(session)
    }

    /// Reopen the visitor's state without recording a visit.
    ///
    /// Used to act on a prompt an earlier visit showed: nothing is written
    /// until the visitor switches, accepts, declines or resets.
    pub fn resume(
        config: &Config,
        catalog: LanguageCatalog,
        store: S,
        location: LocationInfo,
        visit: VisitRequest,
    ) -> Result<Self> {
        let default_language = LanguageCode::from_code(&catalog, &config.default_language)?;
        let fallback_language = LanguageCode::from_code(&catalog, &config.fallback_language)?;
        let preferences = Preferences::new(store, StorageKeys::new(&config.storage_key_prefix));

        let stored = preferences.stored_language().unwrap_or_else(|e| {
            warn!("Could not read stored language: {}", e);
            None
        });
        let declined = preferences.declined().unwrap_or_else(|e| {
            warn!("Could not read recommendation flag: {}", e);
            false
        });

        let context = ResolutionContext::new(default_language, fallback_language)
            .with_path(visit.url_path)
            .with_stored_preference(stored)
            .with_location(location)
            .with_client_language(visit.client_language);
        let resolved = resolve(&context, &catalog);
        debug!("Resolved {} ({})", resolved.code, resolved.provenance);

        Ok(Self {
            catalog,
            preferences,
            site: SiteAddress::new(&config.site_origin, &config.subpath_host_suffix)
                .with_hostname(config.site_hostname.clone()),
            context,
            resolved,
            declined,
        })
    }

    fn record_visit(&self, now: DateTime<Utc>) {
        if let Err(e) = self.preferences.save_language(self.resolved.code) {
            warn!("Could not store resolved language: {}", e);
        }
        if !self.context.location.is_empty() {
            if let Err(e) = self.preferences.save_location(&self.context.location) {
                warn!("Could not cache location: {}", e);
            }
        }
        if let Err(e) = self.preferences.touch_last_visit(now) {
            warn!("Could not record last visit: {}", e);
        }
    }

    pub fn resolved(&self) -> ResolvedLanguage {
        self.resolved
    }

    pub fn context(&self) -> &ResolutionContext {
        &self.context
    }

    pub fn location(&self) -> &LocationInfo {
        &self.context.location
    }

    pub fn catalog(&self) -> &LanguageCatalog {
        &self.catalog
    }

    pub fn preferences(&self) -> &Preferences<S> {
        &self.preferences
    }

    /// Whether this visit qualifies for a switch prompt
    pub fn should_recommend(&self) -> bool {
        should_recommend(&self.context, self.declined, &self.catalog)
    }

    /// Prompt for this visit, compared against the resolved language
    pub fn recommendation(&self) -> Option<RecommendationPayload> {
        self.recommendation_for(self.resolved)
    }

    /// Prompt for a page currently rendered in `shown`
    pub fn recommendation_for(&self, shown: ResolvedLanguage) -> Option<RecommendationPayload> {
        if !self.should_recommend() {
            return None;
        }
        build_recommendation_payload(
            &shown,
            &self.context.location,
            self.context.fallback_language,
            &self.catalog,
        )
    }

    /// Prompt an earlier visit showed for a page rendered in `shown`.
    ///
    /// The language that visit stored on its own does not suppress it; only
    /// a decline or a language in the URL does.
    pub fn shown_recommendation(&self, shown: ResolvedLanguage) -> Option<RecommendationPayload> {
        let path_language = detect_language_from_path(&self.context.url_path, &self.catalog);
        if self.declined || path_language.is_some() {
            return None;
        }
        build_recommendation_payload(
            &shown,
            &self.context.location,
            self.context.fallback_language,
            &self.catalog,
        )
    }

    /// URL of the entry point for `code` on this site
    pub fn language_url(&self, code: LanguageCode) -> String {
        build_language_url(&self.site, &self.context.url_path, code, &self.catalog)
    }

    /// Explicit switch requested by the visitor.
    ///
    /// Unsupported codes are refused and nothing is written.
    pub fn switch_language(&self, code: &str) -> Result<NavigationRequest> {
        let target = match LanguageCode::from_code(&self.catalog, code) {
            Ok(target) => target,
            Err(e) => {
                warn!("Refusing switch to unsupported language '{}'", code);
                return Err(e);
            }
        };

        info!("Switching language: {} -> {}", self.resolved.code, target);
        self.preferences.save_language(target)?;

        Ok(NavigationRequest {
            target_code: target,
            url: self.language_url(target),
        })
    }

    /// The visitor accepted the prompt
    pub fn accept_recommendation(
        &self,
        payload: &RecommendationPayload,
    ) -> Result<NavigationRequest> {
        let current = self.preferences.load(&self.catalog)?;
        let updated = on_accept(&current, payload.target_code);
        self.preferences.save(&updated)?;

        info!("Recommendation accepted: {}", payload.target_code);
        Ok(NavigationRequest {
            target_code: payload.target_code,
            url: self.language_url(payload.target_code),
        })
    }

    /// The visitor refused the prompt; it will not be shown again
    pub fn decline_recommendation(&mut self) -> Result<()> {
        let current = self.preferences.load(&self.catalog)?;
        let updated = on_decline(&current);
        self.preferences.save(&updated)?;
        self.declined = true;

        info!("Language recommendation declined");
        Ok(())
    }

    /// Forget everything stored about the visitor
    pub fn reset_all(&mut self) -> Result<()> {
        self.preferences.reset_all()?;
        self.declined = false;
        Ok(())
    }

    pub fn debug_snapshot(&self) -> Result<DebugSnapshot> {
        let mut snapshot = debug_snapshot(
            &self.preferences,
            &self.catalog,
            self.context.default_language,
            self.context.fallback_language,
            self.context.client_language.clone(),
        )?;
        snapshot.resolved = Some(self.resolved);
        Ok(snapshot)
    }
}
