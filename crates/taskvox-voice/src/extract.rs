//! **CommandExtractor**: deterministic transcript parsing.
//!
//! Three pure entry points:
//! - [`extract_draft`] / [`apply_correction`]: utterance → task draft fields
//! - [`search_keywords`] / [`task_matches`]: spoken query → keyword filter
//! - [`classify_intent`]: short reply → [`Intent`]
//!
//! A draft field is only overwritten when its pattern matches.

use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::HashSet;
use taskvox_core::{Category, TaskDraft, TaskSummary};

/// `.`, `!` or `?` followed by whitespace or end of text. `$10.50` is not a boundary.
static SENTENCE_END: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[.!?]+(?:\s+|$)").expect("sentence regex"));

static PRICE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\$\s*(\d+(?:\.\d+)?)|\b(\d+(?:\.\d+)?)\s*(?:bucks|dollars?)\b")
        .expect("price regex")
});

static DURATION: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\b(\d+)\s*(minutes?|mins?|hours?|hrs?)\b").expect("duration regex")
});

static LOCATION_CUE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(?:at|in|near|around|by)\s+").expect("location regex"));

static NON_WORD: Lazy<Regex> = Lazy::new(|| Regex::new(r"[^\w]+").expect("token regex"));

/// Keyword → category table, in scan order.
const CATEGORY_KEYWORDS: &[(Category, &[&str])] = &[
    (
        Category::CoffeeRun,
        &["coffee", "latte", "espresso", "cappuccino", "starbucks", "cafe", "tea"],
    ),
    (
        Category::PetCare,
        &["dog", "dogs", "pet", "pets", "cat", "cats", "puppy", "kitten"],
    ),
    (
        Category::Transportation,
        &["ride", "rides", "drive", "driving", "car", "lift", "airport", "carpool"],
    ),
    (
        Category::AcademicHelp,
        &["print", "printing", "study", "studying", "notes", "homework", "tutor", "tutoring", "essay", "exam"],
    ),
    (
        Category::Delivery,
        &["deliver", "delivery", "deliveries", "package", "packages", "parcel", "groceries", "grocery", "mail", "pickup"],
    ),
];

const STOP_WORDS: &[&str] = &[
    // pronouns
    "you", "your", "yours", "she", "her", "him", "his", "they", "them", "their", "our", "ours",
    "mine", "myself", "its", "this", "that", "these", "those", "who", "what", "which",
    // auxiliaries
    "are", "was", "were", "been", "being", "have", "has", "had", "does", "did", "can", "could",
    "will", "would", "should", "shall", "may", "might", "must", "don", "doesn", "isn", "aren",
    // function words
    "the", "and", "for", "from", "with", "about", "into", "onto", "any", "some", "there",
    "here", "then", "than", "just", "please", "want", "like", "get", "got",
    // generic task vocabulary
    "task", "tasks", "job", "jobs", "help", "need", "needs", "someone", "somebody", "anyone",
    "anybody", "something", "anything", "find", "search", "looking", "look", "show", "list",
    "available", "nearby", "open",
];

// A trailing `*` matches any token starting with the stem ("accepted", "taking").
const AFFIRMATIVE: &[&str] = &[
    "yes", "yeah", "yep", "sure", "accept*", "tak*", "took", "correct*", "confirm*",
];
const NEGATIVE: &[&str] = &["no", "nope", "wrong*", "incorrect*"];
const ADVANCE: &[&str] = &["next", "another"];
const RESTART: &[&str] = &["back", "search*", "different"];

/// Tokens that flip the affirmative cue right after them ("don't take it", "not sure").
/// Contractions split on the apostrophe, hence the bare `t`.
const NEGATORS: &[&str] = &["not", "never", "don", "dont", "t"];

/// Classified reply to a yes/no or browse prompt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intent {
    Affirmative,
    Negative,
    Advance,
    Restart,
    Unrecognized,
}

/// Split into trimmed sentences without their terminal punctuation.
pub fn sentences(text: &str) -> Vec<&str> {
    SENTENCE_END
        .split(text)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

/// First `$N` / `N dollars` amount.
pub fn extract_price(text: &str) -> Option<f64> {
    let caps = PRICE.captures(text)?;
    let amount = caps.get(1).or_else(|| caps.get(2))?;
    amount.as_str().parse::<f64>().ok().filter(|p| *p >= 0.0)
}

/// First duration phrase, normalized (`"15 minutes"`, `"1 hour"`).
pub fn extract_duration(text: &str) -> Option<String> {
    let caps = DURATION.captures(text)?;
    let amount: u64 = caps.get(1)?.as_str().parse().ok()?;
    let unit = caps.get(2)?.as_str().to_lowercase();
    let unit = if unit.starts_with('h') { "hour" } else { "minute" };
    let plural = if amount == 1 { "" } else { "s" };
    Some(format!("{amount} {unit}{plural}"))
}

/// Text after the first location cue, up to the next sentence boundary.
pub fn extract_location(text: &str) -> Option<String> {
    let cue = LOCATION_CUE.find(text)?;
    let rest = &text[cue.end()..];
    let end = SENTENCE_END.find(rest).map(|m| m.start()).unwrap_or(rest.len());
    let location = rest[..end].trim().trim_end_matches(',').trim();
    (!location.is_empty()).then(|| location.to_string())
}

fn words(text: &str) -> Vec<String> {
    NON_WORD
        .split(&text.to_lowercase())
        .filter(|w| !w.is_empty())
        .map(str::to_string)
        .collect()
}

fn categories_in(words: &[String]) -> Vec<Category> {
    CATEGORY_KEYWORDS
        .iter()
        .filter(|(_, keywords)| words.iter().any(|w| keywords.contains(&w.as_str())))
        .map(|(category, _)| *category)
        .collect()
}

/// First category whose keywords appear in `text`, in table order.
pub fn detect_category(text: &str) -> Option<Category> {
    categories_in(&words(text)).into_iter().next()
}

/// Merge every field recognizable in `text` into `draft`.
pub fn extract_draft(text: &str, draft: &mut TaskDraft) {
    let parts = sentences(text);
    if let Some(first) = parts.first() {
        draft.title = first.to_string();
        draft.description = if parts.len() > 1 {
            parts[1..]
                .iter()
                .map(|s| format!("{s}."))
                .collect::<Vec<_>>()
                .join(" ")
        } else {
            text.trim().to_string()
        };
    }
    apply_correction(text, draft);
}

/// Merge only the patterned fields (price, time, location, category).
pub fn apply_correction(text: &str, draft: &mut TaskDraft) {
    if let Some(price) = extract_price(text) {
        draft.price = price;
    }
    if let Some(duration) = extract_duration(text) {
        draft.estimated_time = duration;
    }
    if let Some(location) = extract_location(text) {
        draft.location = location;
    }
    if let Some(category) = detect_category(text) {
        draft.category = category;
    }
}

/// Filter keywords for a spoken search query.
pub fn search_keywords(text: &str) -> Vec<String> {
    let tokens = words(text);
    let mut seen = HashSet::new();
    let mut keywords: Vec<String> = tokens
        .iter()
        .filter(|w| w.chars().count() >= 3 && !STOP_WORDS.contains(&w.as_str()))
        .filter(|w| seen.insert(w.to_string()))
        .cloned()
        .collect();
    for category in categories_in(&tokens) {
        let name = category.as_str().to_string();
        if seen.insert(name.clone()) {
            keywords.push(name);
        }
    }
    keywords
}

/// True when any keyword occurs in the task's searchable text. No keywords, no match.
pub fn task_matches(task: &TaskSummary, keywords: &[String]) -> bool {
    if keywords.is_empty() {
        return false;
    }
    let haystack = task.searchable_text();
    keywords.iter().any(|k| haystack.contains(k.as_str()))
}

fn cue_matches(token: &str, cue: &str) -> bool {
    match cue.strip_suffix('*') {
        Some(stem) => token.starts_with(stem),
        None => token == cue,
    }
}

/// Classify a short reply by its cues: affirmative, then negative, advance, restart.
///
/// An affirmative cue directly after a negator counts as negative, and a
/// reply opening with "not" is negative. A later "not" elsewhere in the
/// sentence ("yes, I'm not picky") does not cancel a plain yes.
pub fn classify_intent(text: &str) -> Intent {
    let tokens = words(text);
    let has = |cues: &[&str]| {
        tokens
            .iter()
            .any(|t| cues.iter().any(|cue| cue_matches(t, cue)))
    };

    let mut affirmed = false;
    let mut negated = tokens.first().is_some_and(|t| t == "not");
    for (i, token) in tokens.iter().enumerate() {
        if !AFFIRMATIVE.iter().any(|cue| cue_matches(token, cue)) {
            continue;
        }
        if i > 0 && NEGATORS.contains(&tokens[i - 1].as_str()) {
            negated = true;
        } else {
            affirmed = true;
        }
    }

    if affirmed {
        Intent::Affirmative
    } else if negated || has(NEGATIVE) {
        Intent::Negative
    } else if has(ADVANCE) {
        Intent::Advance
    } else if has(RESTART) {
        Intent::Restart
    } else {
        Intent::Unrecognized
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use taskvox_core::{TaskId, TaskStatus, UserId};

    const COFFEE: &str = "I need someone to pick up coffee from Starbucks at Marston Library. \
                          My budget is $10 and it should take about 15 minutes.";

    fn summary(title: &str, description: &str, category: Category, location: &str) -> TaskSummary {
        TaskSummary {
            id: TaskId::generate(),
            title: title.into(),
            description: description.into(),
            category,
            price: 5.0,
            estimated_time: String::new(),
            location: location.into(),
            location_coords: None,
            creator_id: UserId::new("someone"),
            status: TaskStatus::Open,
            accepted_by: None,
            created_at: chrono::Utc::now(),
            distance_from_user: None,
        }
    }

    #[test]
    fn coffee_transcript() {
        let mut draft = TaskDraft::default();
        extract_draft(COFFEE, &mut draft);
        assert_eq!(draft.price, 10.0);
        assert_eq!(draft.estimated_time, "15 minutes");
        assert_eq!(draft.category, Category::CoffeeRun);
        assert!(draft.location.contains("Marston Library"));
        assert_eq!(
            draft.title,
            "I need someone to pick up coffee from Starbucks at Marston Library"
        );
        assert_eq!(
            draft.description,
            "My budget is $10 and it should take about 15 minutes."
        );
    }

    #[test]
    fn decimal_price_is_not_a_sentence_break() {
        assert_eq!(sentences("Pay $10.50 for it. Thanks!"), vec!["Pay $10.50 for it", "Thanks"]);
        assert_eq!(extract_price("Pay $10.50 for it"), Some(10.5));
        assert_eq!(extract_price("I'll give 20 dollars"), Some(20.0));
        assert_eq!(extract_price("no amount here"), None);
    }

    #[test]
    fn durations_normalize() {
        assert_eq!(extract_duration("about 1 min").as_deref(), Some("1 minute"));
        assert_eq!(extract_duration("2 hrs tops").as_deref(), Some("2 hours"));
        assert_eq!(extract_duration("1 hour").as_deref(), Some("1 hour"));
        assert_eq!(extract_duration("soon"), None);
    }

    #[test]
    fn location_stops_at_sentence_boundary() {
        assert_eq!(
            extract_location("Walk my dog near Central Park. It takes an hour.").as_deref(),
            Some("Central Park")
        );
        assert_eq!(extract_location("nothing to see"), None);
    }

    #[test]
    fn single_sentence_fills_title_and_description() {
        let mut draft = TaskDraft::default();
        extract_draft("walk my dog", &mut draft);
        assert_eq!(draft.title, "walk my dog");
        assert_eq!(draft.description, "walk my dog");
        assert_eq!(draft.category, Category::PetCare);
        assert_eq!(draft.price, 10.0);
    }

    #[test]
    fn unmatched_fields_are_left_alone() {
        let mut draft = TaskDraft::default();
        draft.location = "Old Place".into();
        draft.category = Category::Delivery;
        apply_correction("make it $15", &mut draft);
        assert_eq!(draft.price, 15.0);
        assert_eq!(draft.location, "Old Place");
        assert_eq!(draft.category, Category::Delivery);
        assert!(draft.title.is_empty());
    }

    #[test]
    fn first_category_in_table_order_wins() {
        assert_eq!(detect_category("drive my dog to the vet"), Some(Category::PetCare));
        assert_eq!(detect_category("coffee delivery"), Some(Category::CoffeeRun));
        assert_eq!(detect_category("concatenate"), None);
    }

    #[test]
    fn keywords_drop_stop_words_and_add_categories() {
        let keywords = search_keywords("I need someone to get me a coffee, coffee please");
        assert_eq!(keywords, vec!["coffee".to_string(), "coffee_run".to_string()]);
        assert!(search_keywords("is it to me").is_empty());
    }

    #[test]
    fn matching_uses_searchable_text() {
        let task = summary("Latte run", "grab a drink", Category::CoffeeRun, "Union");
        assert!(task_matches(&task, &search_keywords("coffee")));
        assert!(task_matches(&task, &["union".to_string()]));
        assert!(!task_matches(&task, &["printer".to_string()]));
        assert!(!task_matches(&task, &[]));
    }

    #[test]
    fn intents() {
        assert_eq!(classify_intent("Yes please"), Intent::Affirmative);
        assert_eq!(classify_intent("I'll take it"), Intent::Affirmative);
        assert_eq!(classify_intent("no, that's not right"), Intent::Negative);
        assert_eq!(classify_intent("not sure"), Intent::Negative);
        assert_eq!(classify_intent("next one"), Intent::Advance);
        assert_eq!(classify_intent("go back"), Intent::Restart);
        assert_eq!(classify_intent("dog walking"), Intent::Unrecognized);
        assert_eq!(classify_intent("yesterday"), Intent::Unrecognized);
    }

    #[test]
    fn yes_wins_over_a_later_not() {
        assert_eq!(classify_intent("yes, I'm not picky"), Intent::Affirmative);
        assert_eq!(classify_intent("yes that is not a problem"), Intent::Affirmative);
        assert_eq!(classify_intent("not that one"), Intent::Negative);
        assert_eq!(classify_intent("nothing else"), Intent::Unrecognized);
    }

    #[test]
    fn inflected_cues_count() {
        assert_eq!(classify_intent("I confirmed it"), Intent::Affirmative);
        assert_eq!(classify_intent("accepted"), Intent::Affirmative);
        assert_eq!(classify_intent("I'm taking it"), Intent::Affirmative);
        assert_eq!(classify_intent("that's incorrect"), Intent::Negative);
        assert_eq!(classify_intent("searching again"), Intent::Restart);
    }

    #[test]
    fn negated_affirmatives_are_negative() {
        assert_eq!(classify_intent("don't take it"), Intent::Negative);
        assert_eq!(classify_intent("that isn't correct"), Intent::Negative);
        assert_eq!(classify_intent("never accept that"), Intent::Negative);
    }
}
