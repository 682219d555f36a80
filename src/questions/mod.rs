use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use rand::Rng;
use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Difficulty {
    Easy,
    Medium,
    Hard,
}

/// A practice question assigned to an interview room at creation time.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Question {
    pub id: String,
    pub title: String,
    pub description: String,
    pub difficulty: Difficulty,
    pub topics: Vec<String>,
    pub sample_input: String,
    pub sample_output: String,
}

/// Optional constraints resolved against a question when matchmaking.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct QuestionFilter {
    pub difficulty: Option<Difficulty>,
    pub topic: Option<String>,
}

impl QuestionFilter {
    pub fn matches(&self, question: &Question) -> bool {
        if let Some(difficulty) = self.difficulty {
            if question.difficulty != difficulty {
                return false;
            }
        }
        if let Some(topic) = &self.topic {
            if !question.topics.iter().any(|t| t.eq_ignore_ascii_case(topic)) {
                return false;
            }
        }
        true
    }
}

/// Source of questions for room creation. The question bank itself is an
/// external collaborator; the coordinator core only consumes this interface.
#[async_trait]
pub trait QuestionSupplier: Send + Sync {
    /// Pick a question matching the filter, or None if nothing matches.
    async fn pick(&self, filter: &QuestionFilter) -> Option<Question>;

    /// Fetch a specific question by id.
    async fn get(&self, question_id: &str) -> Option<Question>;
}

/// In-memory question bank with random selection among filter matches.
pub struct InMemoryQuestionBank {
    questions: RwLock<HashMap<String, Question>>,
}

impl InMemoryQuestionBank {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            questions: RwLock::new(HashMap::new()),
        })
    }

    /// Question bank preloaded with a small practice set.
    pub fn with_seed_questions() -> Arc<Self> {
        let map = seed_questions()
            .into_iter()
            .map(|q| (q.id.clone(), q))
            .collect();
        Arc::new(Self {
            questions: RwLock::new(map),
        })
    }

    pub async fn add(&self, question: Question) {
        let mut questions = self.questions.write().await;
        questions.insert(question.id.clone(), question);
    }

    pub async fn add_all(&self, batch: Vec<Question>) {
        let mut questions = self.questions.write().await;
        for question in batch {
            questions.insert(question.id.clone(), question);
        }
    }
}

#[async_trait]
impl QuestionSupplier for InMemoryQuestionBank {
    async fn pick(&self, filter: &QuestionFilter) -> Option<Question> {
        let questions = self.questions.read().await;
        let matching: Vec<&Question> = questions.values().filter(|q| filter.matches(q)).collect();

        if matching.is_empty() {
            return None;
        }

        let index = rand::thread_rng().gen_range(0..matching.len());
        Some(matching[index].clone())
    }

    async fn get(&self, question_id: &str) -> Option<Question> {
        let questions = self.questions.read().await;
        questions.get(question_id).cloned()
    }
}

fn question(
    title: &str,
    description: &str,
    difficulty: Difficulty,
    topics: &[&str],
    sample_input: &str,
    sample_output: &str,
) -> Question {
    Question {
        id: Uuid::new_v4().to_string(),
        title: title.to_string(),
        description: description.to_string(),
        difficulty,
        topics: topics.iter().map(|t| t.to_string()).collect(),
        sample_input: sample_input.to_string(),
        sample_output: sample_output.to_string(),
    }
}

pub fn seed_questions() -> Vec<Question> {
    vec![
        question(
            "Two Sum",
            "Given an array of integers nums and an integer target, return indices of the two numbers such that they add up to target.",
            Difficulty::Easy,
            &["Array", "Hash Table"],
            "nums = [2,7,11,15], target = 9",
            "[0,1]",
        ),
        question(
            "Valid Palindrome",
            "Given a string s, return true if it is a palindrome considering only alphanumeric characters and ignoring cases.",
            Difficulty::Easy,
            &["String", "Two Pointers"],
            "s = \"A man, a plan, a canal: Panama\"",
            "true",
        ),
        question(
            "Add Two Numbers",
            "You are given two non-empty linked lists representing two non-negative integers. Add the two numbers and return the sum as a linked list.",
            Difficulty::Medium,
            &["Linked List", "Math"],
            "l1 = [2,4,3], l2 = [5,6,4]",
            "[7,0,8]",
        ),
        question(
            "Longest Substring Without Repeating Characters",
            "Given a string s, find the length of the longest substring without repeating characters.",
            Difficulty::Medium,
            &["Hash Table", "String", "Sliding Window"],
            "s = \"abcabcbb\"",
            "3",
        ),
        question(
            "Median of Two Sorted Arrays",
            "Given two sorted arrays nums1 and nums2, return the median of the two sorted arrays.",
            Difficulty::Hard,
            &["Array", "Binary Search", "Divide and Conquer"],
            "nums1 = [1,3], nums2 = [2]",
            "2.0",
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_pick_without_filter() {
        let bank = InMemoryQuestionBank::new();
        bank.add_all(seed_questions()).await;

        let picked = bank.pick(&QuestionFilter::default()).await;
        assert!(picked.is_some());
    }

    #[tokio::test]
    async fn test_pick_honors_difficulty_filter() {
        let bank = InMemoryQuestionBank::new();
        bank.add_all(seed_questions()).await;

        let filter = QuestionFilter {
            difficulty: Some(Difficulty::Hard),
            topic: None,
        };

        for _ in 0..10 {
            let picked = bank.pick(&filter).await.expect("hard question exists");
            assert_eq!(picked.difficulty, Difficulty::Hard);
        }
    }

    #[tokio::test]
    async fn test_pick_honors_topic_filter() {
        let bank = InMemoryQuestionBank::new();
        bank.add_all(seed_questions()).await;

        let filter = QuestionFilter {
            difficulty: None,
            topic: Some("linked list".to_string()),
        };

        let picked = bank.pick(&filter).await.expect("linked list question exists");
        assert!(picked.topics.iter().any(|t| t.eq_ignore_ascii_case("linked list")));
    }

    #[tokio::test]
    async fn test_pick_returns_none_when_nothing_matches() {
        let bank = InMemoryQuestionBank::new();
        bank.add_all(seed_questions()).await;

        let filter = QuestionFilter {
            difficulty: Some(Difficulty::Hard),
            topic: Some("Graphs".to_string()),
        };

        assert!(bank.pick(&filter).await.is_none());
    }

    #[tokio::test]
    async fn test_get_by_id() {
        let bank = InMemoryQuestionBank::new();
        let questions = seed_questions();
        let wanted = questions[0].clone();
        bank.add_all(questions).await;

        let fetched = bank.get(&wanted.id).await.expect("question exists");
        assert_eq!(fetched.title, wanted.title);

        assert!(bank.get("no-such-id").await.is_none());
    }
}
