use crate::constants::FUZZY_MATCH_THRESHOLD;

/// Best known title for a scraped one; empty title and zero score when nothing qualifies.
#[derive(Debug, Clone, PartialEq)]
pub struct TitleMatch {
    pub title: String,
    pub score: f64,
}

impl TitleMatch {
    fn none() -> Self {
        Self {
            title: String::new(),
            score: 0.0,
        }
    }

    pub fn is_match(&self) -> bool {
        !self.title.is_empty()
    }
}

/// Match a scraped title against known titles.
///
/// Exact (case-insensitive, trimmed) matches score 1.0. When one title
/// contains the other the score is the length ratio; otherwise it is the
/// normalized Levenshtein similarity over code points.
pub fn fuzzy_match_title<S: AsRef<str>>(title: &str, known_titles: &[S]) -> TitleMatch {
    let norm_title = title.trim().to_lowercase();
    let title_len = norm_title.chars().count();
    let mut best = TitleMatch::none();

    for known in known_titles {
        let known = known.as_ref();
        let norm_known = known.trim().to_lowercase();

        if norm_title == norm_known {
            return TitleMatch {
                title: known.to_string(),
                score: 1.0,
            };
        }

        let known_len = norm_known.chars().count();
        let longest = title_len.max(known_len);
        if longest == 0 {
            continue;
        }

        let score = if norm_title.contains(&norm_known) || norm_known.contains(&norm_title) {
            title_len.min(known_len) as f64 / longest as f64
        } else {
            1.0 - levenshtein(&norm_title, &norm_known) as f64 / longest as f64
        };

        if score > best.score {
            best = TitleMatch {
                title: known.to_string(),
                score,
            };
        }
    }

    if best.score < FUZZY_MATCH_THRESHOLD {
        return TitleMatch::none();
    }
    best
}

/// Edit distance over Unicode code points.
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];

    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }

    prev[b.len()]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exact_match() {
        let m = fuzzy_match_title("La Traviata", &["La Traviata", "Carmen"]);
        assert_eq!(m.title, "La Traviata");
        assert_eq!(m.score, 1.0);
    }

    #[test]
    fn test_exact_match_ignores_case_and_padding() {
        let m = fuzzy_match_title("  CARMEN ", &["Tosca", "Carmen"]);
        assert_eq!(m, TitleMatch { title: "Carmen".into(), score: 1.0 });
    }

    #[test]
    fn test_containment_match() {
        let m = fuzzy_match_title("Traviata", &["La Traviata"]);
        assert!(m.is_match());
        assert_eq!(m.title, "La Traviata");
        assert!(m.score >= 0.6);
        assert!((m.score - 8.0 / 11.0).abs() < 1e-9);
    }

    #[test]
    fn test_no_match() {
        let m = fuzzy_match_title("Xyzzy123", &["La Traviata", "Carmen"]);
        assert!(!m.is_match());
        assert_eq!(m.title, "");
        assert_eq!(m.score, 0.0);
    }

    #[test]
    fn test_misspelling_matches_by_edit_distance() {
        let m = fuzzy_match_title("Rigoleto", &["Carmen", "Rigoletto"]);
        assert_eq!(m.title, "Rigoletto");
        assert!((m.score - (1.0 - 1.0 / 9.0)).abs() < 1e-9);
    }

    #[test]
    fn test_best_candidate_wins() {
        let m = fuzzy_match_title(
            "The Magic Flute",
            &["Magic", "The Magic Flute (Die Zauberflöte)", "Magic Flute"],
        );
        assert_eq!(m.title, "Magic Flute");
    }

    #[test]
    fn test_levenshtein_counts_code_points() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(levenshtein("Così", "Cosi"), 1);
    }
}
