//! CTA click classification and deduplication.

use beacon_protocol::CtaClass;
use chrono::{DateTime, TimeDelta, Utc};
use std::collections::HashMap;
use std::time::Duration;

/// DOM attribute a component sets on elements whose clicks it reports itself.
/// The passive page-wide listener skips elements carrying it.
pub const CLICK_OPTOUT_ATTR: &str = "data-beacon-click-owned";

/// CSS class that force-classifies an element as a booking CTA regardless of
/// its target or text.
pub const BOOKING_MARKER_CLASS: &str = "beacon-booking-cta";

/// Identical (target, label) pairs clicked again inside this window are not
/// re-reported.
pub const DEFAULT_CTA_DEDUP_WINDOW: Duration = Duration::from_secs(3);

/// Booking-intent heuristics, configurable per deployment.
#[derive(Debug, Clone)]
pub struct CtaRules {
    /// Hosts of the external booking backend.
    pub booking_domains: Vec<String>,
    pub marker_class: String,
}

impl Default for CtaRules {
    fn default() -> Self {
        Self {
            booking_domains: vec!["bookeo.com".to_owned()],
            marker_class: BOOKING_MARKER_CLASS.to_owned(),
        }
    }
}

/// One click as seen by the host glue.
#[derive(Debug, Clone, Default)]
pub struct ClickEvent {
    pub href: String,
    /// Visible text of the clicked element.
    pub text: String,
    pub classes: Vec<String>,
    /// The element carried [`CLICK_OPTOUT_ATTR`]; the passive path must skip it.
    pub explicitly_handled: bool,
}

/// Booking-intent classification, pure and free of any event wiring.
pub fn classify(href: &str, text: &str, classes: &[String], rules: &CtaRules) -> CtaClass {
    let href_lower = href.to_lowercase();
    let text_lower = text.to_lowercase();

    if rules
        .booking_domains
        .iter()
        .any(|domain| href_lower.contains(&domain.to_lowercase()))
        || href_lower.contains("book")
        || text_lower.contains("book")
        || classes.iter().any(|class| class == &rules.marker_class)
    {
        CtaClass::Booking
    } else {
        CtaClass::Other
    }
}

/// Suppresses repeated reports of the same (target, label) pair.
#[derive(Debug)]
pub struct CtaDeduper {
    window: TimeDelta,
    seen: HashMap<(String, String), DateTime<Utc>>,
}

impl CtaDeduper {
    pub fn new(window: Duration) -> Self {
        Self {
            window: TimeDelta::from_std(window).unwrap_or_default(),
            seen: HashMap::new(),
        }
    }

    /// True when this click should produce a report; records it if so.
    pub fn should_report(&mut self, target: &str, label: &str, at: DateTime<Utc>) -> bool {
        let key = (target.to_owned(), label.to_owned());
        if let Some(previous) = self.seen.get(&key)
            && at - *previous < self.window
        {
            return false;
        }
        self.seen.retain(|_, seen_at| at - *seen_at < self.window);
        self.seen.insert(key, at);
        true
    }
}

impl Default for CtaDeduper {
    fn default() -> Self {
        Self::new(DEFAULT_CTA_DEDUP_WINDOW)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn booking_domain_in_target_classifies_as_booking() {
        let rules = CtaRules::default();
        assert_eq!(
            classify("https://bookeo.com/vrvenue?game=outbreak", "Reserve now", &[], &rules),
            CtaClass::Booking
        );
    }

    #[test]
    fn book_substring_in_text_classifies_as_booking() {
        let rules = CtaRules::default();
        assert_eq!(
            classify("/games/far-cry", "BOOK FAR CRY VR", &[], &rules),
            CtaClass::Booking
        );
        assert_eq!(
            classify("/booking", "More info", &[], &rules),
            CtaClass::Booking
        );
    }

    #[test]
    fn marker_class_overrides_neutral_target_and_text() {
        let rules = CtaRules::default();
        let classes = vec!["btn".to_owned(), BOOKING_MARKER_CLASS.to_owned()];
        assert_eq!(
            classify("/contact", "Get in touch", &classes, &rules),
            CtaClass::Booking
        );
    }

    #[test]
    fn everything_else_is_other() {
        let rules = CtaRules::default();
        assert_eq!(
            classify("/games/outbreak", "View details", &["btn".to_owned()], &rules),
            CtaClass::Other
        );
    }

    #[test]
    fn identical_clicks_inside_window_report_once() {
        let mut dedupe = CtaDeduper::default();
        let t0 = Utc::now();
        assert!(dedupe.should_report("/book", "BOOK NOW", t0));
        assert!(!dedupe.should_report("/book", "BOOK NOW", t0 + TimeDelta::milliseconds(1500)));
        assert!(!dedupe.should_report("/book", "BOOK NOW", t0 + TimeDelta::milliseconds(2900)));
    }

    #[test]
    fn click_after_window_reports_again() {
        let mut dedupe = CtaDeduper::default();
        let t0 = Utc::now();
        assert!(dedupe.should_report("/book", "BOOK NOW", t0));
        assert!(!dedupe.should_report("/book", "BOOK NOW", t0 + TimeDelta::milliseconds(2000)));
        assert!(dedupe.should_report("/book", "BOOK NOW", t0 + TimeDelta::milliseconds(3100)));
    }

    #[test]
    fn different_labels_do_not_collide() {
        let mut dedupe = CtaDeduper::default();
        let t0 = Utc::now();
        assert!(dedupe.should_report("/book", "BOOK NOW", t0));
        assert!(dedupe.should_report("/book", "BOOK OUTBREAK", t0));
    }
}
