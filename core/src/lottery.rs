//! Lottery resolution from a closed forum thread.
//!
//! The forum's lottery bot closes the topic and posts a result as the last
//! post. That post carries an author line and a winner section listing one
//! `@username` mention per prize, in prize order:
//!
//! ```text
//! 帖子作者: alice
//! ...
//! ### 以下为中奖佬友及对应楼层：
//! - @bob (12楼)
//! - @carol (30楼)
//! ```
//!
//! [`LotteryPost::parse`] extracts both parts without any I/O;
//! [`resolve_winners`] fetches the post through a [`ForumClient`], validates
//! it against the project and merges each winner's prizes into one item.

use crate::error::LotteryError;
use crate::providers::ForumClient;
use once_cell::sync::Lazy;
use regex::Regex;

/// Tag a topic must carry to be used as a lottery source.
pub const LOTTERY_TAG: &str = "抽奖";

/// Label prefixed to each prize in merged content.
pub const PRIZE_LABEL: &str = "中奖码";

/// Separator between prizes when one winner holds several.
pub const PRIZE_SEPARATOR: &str = "$\n*";

#[allow(clippy::unwrap_used)]
static AUTHOR_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"帖子作者: (.+?)\n").unwrap());

#[allow(clippy::unwrap_used)]
static WINNER_SECTION_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"### 以下为中奖佬友及对应楼层：\n((?s).+)").unwrap());

#[allow(clippy::unwrap_used)]
static MENTION_RE: Lazy<Regex> = Lazy::new(|| Regex::new(r"@(\S+)").unwrap());

/// Parsed lottery result post.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct LotteryPost {
    /// Username on the author line
    pub author: String,
    /// Winner mentions in order of appearance, duplicates kept
    pub winners: Vec<String>,
}

impl LotteryPost {
    /// Parse the raw markdown of a lottery result post.
    ///
    /// # Errors
    ///
    /// Returns [`LotteryError::Malformed`] when the author line or winner
    /// section is missing, or the section mentions nobody.
    pub fn parse(raw: &str) -> Result<Self, LotteryError> {
        let author = post_author(raw)?.to_string();

        let section = WINNER_SECTION_RE
            .captures(raw)
            .and_then(|c| c.get(1))
            .ok_or_else(|| LotteryError::Malformed("missing winner section".into()))?;

        let winners: Vec<String> = MENTION_RE
            .captures_iter(section.as_str())
            .filter_map(|c| c.get(1))
            .map(|m| m.as_str().to_string())
            .collect();

        if winners.is_empty() {
            return Err(LotteryError::Malformed("winner section mentions nobody".into()));
        }

        Ok(Self { author, winners })
    }
}

/// Username on a result post's author line.
///
/// # Errors
///
/// Returns [`LotteryError::Malformed`] when the author line is missing.
pub fn post_author(raw: &str) -> Result<&str, LotteryError> {
    AUTHOR_RE
        .captures(raw)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str())
        .ok_or_else(|| LotteryError::Malformed("missing author line".into()))
}

/// Merged prize content reserved for one winner.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WinnerAllocation {
    /// Winner's forum username
    pub winner: String,
    /// All of the winner's prizes, labelled and joined
    pub content: String,
}

/// Pair winners with prizes by position and merge prizes per winner.
///
/// Winners are returned in order of first appearance. A winner mentioned
/// several times receives `中奖码1: …$\n*中奖码2: …` in mention order.
///
/// # Errors
///
/// Returns [`LotteryError::CountMismatch`] when the number of mentions
/// differs from the number of prizes.
pub fn merge_prizes(
    winners: &[String],
    prizes: &[String],
) -> Result<Vec<WinnerAllocation>, LotteryError> {
    if winners.len() != prizes.len() {
        return Err(LotteryError::CountMismatch {
            winners: winners.len(),
            prizes: prizes.len(),
        });
    }

    let mut grouped: Vec<(&str, Vec<&str>)> = Vec::new();
    for (winner, prize) in winners.iter().zip(prizes) {
        match grouped.iter_mut().find(|(name, _)| *name == winner.as_str()) {
            Some((_, held)) => held.push(prize),
            None => grouped.push((winner, vec![prize])),
        }
    }

    Ok(grouped
        .into_iter()
        .map(|(winner, held)| WinnerAllocation {
            winner: winner.to_string(),
            content: held
                .iter()
                .enumerate()
                .map(|(i, prize)| format!("{PRIZE_LABEL}{}: {prize}", i + 1))
                .collect::<Vec<_>>()
                .join(PRIZE_SEPARATOR),
        })
        .collect())
}

/// Fetch, validate and allocate a forum lottery.
///
/// 1. The topic must carry [`LOTTERY_TAG`] and be closed.
/// 2. The last post's author line must name `expected_author`.
/// 3. The post must mention exactly one winner per prize.
///
/// # Errors
///
/// - [`LotteryError::NotEligible`] if the topic is untagged or still open
/// - [`LotteryError::AuthorMismatch`] if the author differs
/// - [`LotteryError::Malformed`] / [`LotteryError::CountMismatch`] from parsing
/// - [`LotteryError::Forum`] if the forum cannot be reached
pub async fn resolve_winners(
    forum: &dyn ForumClient,
    topic_id: u64,
    expected_author: &str,
    prizes: &[String],
) -> Result<Vec<WinnerAllocation>, LotteryError> {
    let topic = forum.topic(topic_id).await?;

    if !topic.tags.iter().any(|t| t == LOTTERY_TAG) {
        return Err(LotteryError::NotEligible(format!(
            "topic {topic_id} is not tagged {LOTTERY_TAG}"
        )));
    }
    if !topic.closed {
        return Err(LotteryError::NotEligible(format!(
            "topic {topic_id} is still open"
        )));
    }

    let raw = forum.raw_post(topic_id, topic.highest_post_number).await?;
    let author = post_author(&raw)?;
    if author != expected_author {
        tracing::debug!(
            topic_id,
            author = %author,
            expected = %expected_author,
            "Lottery author mismatch"
        );
        return Err(LotteryError::AuthorMismatch);
    }

    let post = LotteryPost::parse(&raw)?;

    let allocations = merge_prizes(&post.winners, prizes)?;
    tracing::debug!(
        topic_id,
        winners = allocations.len(),
        prizes = prizes.len(),
        "Lottery resolved"
    );
    Ok(allocations)
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    const RESULT_POST: &str = "\
## 抽奖结果

帖子作者: alice
参与人数: 57

### 以下为中奖佬友及对应楼层：
- @bob (12楼)
- @carol (30楼)
- @bob (41楼)
";

    fn prizes(n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("CODE-{i}")).collect()
    }

    #[test]
    fn parses_author_and_winners_in_order() {
        let post = LotteryPost::parse(RESULT_POST).unwrap();
        assert_eq!(post.author, "alice");
        assert_eq!(post.winners, vec!["bob", "carol", "bob"]);
    }

    #[test]
    fn author_is_readable_without_winner_section() {
        assert_eq!(post_author("帖子作者: dave\n还没有开奖\n"), Ok("dave"));
        assert!(LotteryPost::parse("帖子作者: dave\n还没有开奖\n").is_err());
    }

    #[test]
    fn missing_author_is_malformed() {
        let raw = "### 以下为中奖佬友及对应楼层：\n@bob\n";
        assert!(matches!(LotteryPost::parse(raw), Err(LotteryError::Malformed(_))));
    }

    #[test]
    fn missing_section_is_malformed() {
        let raw = "帖子作者: alice\nno winners here\n";
        assert!(matches!(LotteryPost::parse(raw), Err(LotteryError::Malformed(_))));
    }

    #[test]
    fn empty_section_is_malformed() {
        let raw = "帖子作者: alice\n### 以下为中奖佬友及对应楼层：\nnobody won\n";
        assert!(matches!(LotteryPost::parse(raw), Err(LotteryError::Malformed(_))));
    }

    #[test]
    fn repeated_winner_gets_merged_prizes() {
        let post = LotteryPost::parse(RESULT_POST).unwrap();
        let allocations = merge_prizes(&post.winners, &prizes(3)).unwrap();
        assert_eq!(
            allocations,
            vec![
                WinnerAllocation {
                    winner: "bob".into(),
                    content: "中奖码1: CODE-1$\n*中奖码2: CODE-3".into(),
                },
                WinnerAllocation {
                    winner: "carol".into(),
                    content: "中奖码1: CODE-2".into(),
                },
            ]
        );
    }

    #[test]
    fn count_mismatch() {
        let post = LotteryPost::parse(RESULT_POST).unwrap();
        assert_eq!(
            merge_prizes(&post.winners, &prizes(2)),
            Err(LotteryError::CountMismatch { winners: 3, prizes: 2 })
        );
    }

    proptest! {
        #[test]
        fn merge_preserves_every_prize(names in proptest::collection::vec("[a-c]", 1..12)) {
            let prizes = prizes(names.len());
            let allocations = merge_prizes(&names, &prizes).unwrap();
            let labelled: usize = allocations
                .iter()
                .map(|a| a.content.matches(PRIZE_LABEL).count())
                .sum();
            prop_assert_eq!(labelled, prizes.len());

            let mut distinct = names.clone();
            distinct.sort();
            distinct.dedup();
            prop_assert_eq!(allocations.len(), distinct.len());
        }
    }
}
