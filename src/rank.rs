// src/rank.rs
//! Top-N selection per category. Pure, no I/O.

use chrono::{DateTime, Utc};

use crate::model::{Article, Category, EnrichedArticle};

pub trait Rankable {
    fn category(&self) -> Category;
    fn published_at(&self) -> DateTime<Utc>;
}

impl Rankable for Article {
    fn category(&self) -> Category {
        self.category
    }
    fn published_at(&self) -> DateTime<Utc> {
        self.published_at
    }
}

impl Rankable for EnrichedArticle {
    fn category(&self) -> Category {
        self.article.category
    }
    fn published_at(&self) -> DateTime<Utc> {
        self.article.published_at
    }
}

/// Keep items of `category`, newest first, at most `top_n`.
/// Equal timestamps keep their arrival order.
pub fn select_top<T: Rankable>(category: Category, candidates: Vec<T>, top_n: usize) -> Vec<T> {
    let mut out: Vec<T> = candidates
        .into_iter()
        .filter(|c| c.category() == category)
        .collect();
    // `sort_by` is stable.
    out.sort_by(|a, b| b.published_at().cmp(&a.published_at()));
    out.truncate(top_n);
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::Source;
    use chrono::{Duration, TimeZone};
    use rand::seq::SliceRandom;

    fn art(n: usize, cat: Category, minutes: i64) -> Article {
        let base = Utc.with_ymd_and_hms(2025, 6, 1, 12, 0, 0).unwrap();
        let ts = base + Duration::minutes(minutes);
        Article::new(
            Source::Reuters,
            cat,
            format!("a{n}"),
            format!("https://x.test/{n}"),
            ts,
            ts,
        )
    }

    #[test]
    fn filters_sorts_and_truncates() {
        let v = vec![
            art(1, Category::World, 5),
            art(2, Category::Business, 50),
            art(3, Category::World, 30),
            art(4, Category::World, 10),
        ];
        let top = select_top(Category::World, v, 2);
        let titles: Vec<_> = top.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["a3", "a4"]);
    }

    #[test]
    fn ties_keep_arrival_order() {
        let v = vec![
            art(1, Category::World, 0),
            art(2, Category::World, 0),
            art(3, Category::World, 0),
        ];
        let top = select_top(Category::World, v, 5);
        let titles: Vec<_> = top.iter().map(|a| a.title.as_str()).collect();
        assert_eq!(titles, vec!["a1", "a2", "a3"]);
    }

    #[test]
    fn holds_for_shuffled_mixed_inputs() {
        let mut rng = rand::rng();
        let cats = Category::ALL;
        for round in 0..50 {
            let mut v: Vec<Article> = (0..20)
                .map(|i| art(i, cats[i % 3], ((i * 7 + round) % 13) as i64))
                .collect();
            v.shuffle(&mut rng);
            for n in [0, 1, 3, 10] {
                let top = select_top(Category::Technology, v.clone(), n);
                assert!(top.len() <= n);
                assert!(top.iter().all(|a| a.category == Category::Technology));
                assert!(top
                    .windows(2)
                    .all(|w| w[0].published_at >= w[1].published_at));
            }
        }
    }
}
