// tests/relevance_scoring.rs
// Hand-picked vectors for the pre-extraction scorer and the recency boost.

use std::collections::BTreeSet;

use chrono::{Duration, Utc};
use relevance_scraper::domains::{host_of, DomainSets};
use relevance_scraper::relevance::{apply_recency_boost, evaluate, normalize, passes, score};

fn seed() -> DomainSets {
    DomainSets::default_seed()
}

#[test]
fn matching_trusted_record_scores_one() {
    let s = score(
        "eleição",
        "Eleição 2024 é tema de debate nacional",
        "A eleição...",
        "https://g1.globo.com/noticia",
        &seed(),
    );
    assert_eq!(s, 1.0);
}

#[test]
fn unrelated_record_scores_zero_and_fails() {
    let s = score(
        "xyz",
        "Short",
        "nothing",
        "http://unknown.com/a?x=1",
        &seed(),
    );
    assert_eq!(s, 0.0);
    assert!(!passes(s, 0.5));
}

#[test]
fn term_match_ignores_case() {
    let r = evaluate("ELEIÇÃO", "eleição hoje", "", "", &seed());
    assert!(r.reasons.contains(&"term_in_title"));
}

#[test]
fn host_match_is_exact_and_case_sensitive() {
    let d = seed();
    assert!(d.is_trusted(&host_of("https://g1.globo.com/x")));
    assert!(!d.is_trusted(&host_of("https://G1.GLOBO.COM/x")));
    assert!(!d.is_trusted(&host_of("https://globo.com/x")));
    assert!(d.is_trusted(&host_of("https://user:pw@g1.globo.com:8443/x")));
    assert_eq!(host_of("g1.globo.com/sem-esquema"), "");
    assert_eq!(host_of("not a url"), "");
}

#[test]
fn social_hosts_include_bare_youtube() {
    let d = seed();
    assert!(d.is_social(&host_of("https://youtube.com/watch?v=1")));
    assert!(d.is_social(&host_of("https://www.youtube.com/watch?v=1")));
    assert!(!d.is_social(&host_of("https://m.youtube.com/watch?v=1")));
}

#[test]
fn exactly_half_passes_default_threshold() {
    // 30 (title) + 10 (snippet) = 40 / 80
    let s = score("copa", "copa", "copa", "https://x.example/a?b=1", &seed());
    assert_eq!(s, 0.5);
    assert!(passes(s, 0.5));
    assert!(!passes(0.49, 0.5));
}

#[test]
fn boost_depends_on_publish_age() {
    let now = Utc::now();
    let fresh = apply_recency_boost(0.5, Some(now - Duration::days(100)), now);
    let stale = apply_recency_boost(0.5, Some(now - Duration::days(800)), now);
    assert!((fresh - 0.6).abs() < 1e-12);
    assert_eq!(stale, 0.5);
}

#[test]
fn every_criteria_subset_lands_on_a_rounded_eightieth() {
    let d = seed();
    let weights = [30u32, 10, 25, 5, 10];
    let mut seen = BTreeSet::new();

    for mask in 0u32..32 {
        let on = |bit: u32| mask & (1 << bit) != 0;
        let title = match (on(0), on(4)) {
            (true, true) => "alvo um dois tres",
            (true, false) => "alvo",
            (false, true) => "nada um dois tres",
            (false, false) => "nada",
        };
        let snippet = if on(1) { "alvo" } else { "nada" };
        let host = if on(2) { "g1.globo.com" } else { "x.example" };
        let query = if on(3) { "" } else { "?p=1" };
        let link = format!("https://{host}/n{query}");

        let r = evaluate("alvo", title, snippet, &link, &d);
        let expected: u32 = (0..5).filter(|&b| on(b)).map(|b| weights[b as usize]).sum();
        assert_eq!(r.raw, expected, "mask {mask:05b}");
        assert_eq!(r.score, normalize(expected), "mask {mask:05b}");
        assert_ne!(r.score, 0.4375, "mask {mask:05b}");
        seen.insert((r.score * 100.0).round() as u32);
    }

    let reachable: BTreeSet<u32> = [
        0, 6, 12, 19, 25, 31, 38, 44, 50, 56, 62, 69, 75, 81, 88, 94, 100,
    ]
    .into_iter()
    .collect();
    assert_eq!(seen, reachable);
}
