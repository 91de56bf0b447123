//! Topic hierarchy for a single subject.
//!
//! Stored as an id → topic index plus a parent → children adjacency map.
//! Construction validates that ids are unique and that parents form a tree.

use std::collections::{HashMap, HashSet};

use crate::error::ExamError;
use crate::model::Topic;

#[derive(Debug, Clone)]
pub struct TopicGraph {
    subject: String,
    /// Topic ids in the order the reader returned them.
    order: Vec<String>,
    index: HashMap<String, Topic>,
    children: HashMap<String, Vec<String>>,
}

impl TopicGraph {
    /// Build and validate the hierarchy for `subject`.
    pub fn build(subject: &str, topics: Vec<Topic>) -> Result<Self, ExamError> {
        let mut order = Vec::with_capacity(topics.len());
        let mut index = HashMap::with_capacity(topics.len());

        for topic in topics {
            if topic.subject != subject {
                return Err(ExamError::integrity(format!(
                    "topic '{}' belongs to subject '{}', expected '{subject}'",
                    topic.id, topic.subject
                )));
            }
            if index.contains_key(&topic.id) {
                return Err(ExamError::integrity(format!(
                    "duplicate topic id '{}' in subject '{subject}'",
                    topic.id
                )));
            }
            order.push(topic.id.clone());
            index.insert(topic.id.clone(), topic);
        }

        let mut children: HashMap<String, Vec<String>> = HashMap::new();
        for id in &order {
            let topic = &index[id];
            if let Some(parent) = &topic.parent {
                if !index.contains_key(parent) {
                    return Err(ExamError::integrity(format!(
                        "topic '{id}' has unknown parent '{parent}'"
                    )));
                }
                children.entry(parent.clone()).or_default().push(id.clone());
            }
        }

        let graph = Self {
            subject: subject.to_string(),
            order,
            index,
            children,
        };
        graph.check_acyclic()?;
        Ok(graph)
    }

    fn check_acyclic(&self) -> Result<(), ExamError> {
        for id in &self.order {
            let mut seen = HashSet::new();
            let mut current = Some(id.as_str());
            while let Some(node) = current {
                if !seen.insert(node) {
                    return Err(ExamError::integrity(format!(
                        "topic '{id}' is its own ancestor"
                    )));
                }
                current = self.index[node].parent.as_deref();
            }
        }
        Ok(())
    }

    pub fn subject(&self) -> &str {
        &self.subject
    }

    pub fn len(&self) -> usize {
        self.order.len()
    }

    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Topic> {
        self.index.get(id)
    }

    /// All topics in reader order.
    pub fn topics(&self) -> impl Iterator<Item = &Topic> {
        self.order.iter().map(move |id| &self.index[id])
    }

    /// Topics without a parent, in reader order.
    pub fn roots(&self) -> impl Iterator<Item = &Topic> {
        self.topics().filter(|t| t.parent.is_none())
    }

    /// Direct children of `id`, in reader order.
    pub fn children(&self, id: &str) -> impl Iterator<Item = &Topic> {
        self.children
            .get(id)
            .into_iter()
            .flatten()
            .map(move |child| &self.index[child])
    }

    /// Parent chain of `id`, nearest first.
    pub fn ancestors(&self, id: &str) -> Vec<&Topic> {
        let mut chain = Vec::new();
        let mut current = self.index.get(id).and_then(|t| t.parent.as_deref());
        while let Some(parent) = current {
            let topic = &self.index[parent];
            chain.push(topic);
            current = topic.parent.as_deref();
        }
        chain
    }

    /// Every topic below `id`, depth first.
    pub fn descendants(&self, id: &str) -> Vec<&Topic> {
        let mut out = Vec::new();
        let mut stack: Vec<&str> = self
            .children
            .get(id)
            .map(|c| c.iter().rev().map(String::as_str).collect())
            .unwrap_or_default();
        while let Some(next) = stack.pop() {
            out.push(&self.index[next]);
            if let Some(grandchildren) = self.children.get(next) {
                stack.extend(grandchildren.iter().rev().map(String::as_str));
            }
        }
        out
    }

    /// `true` if `id` is `root` or sits somewhere below it.
    pub fn is_within(&self, root: &str, id: &str) -> bool {
        id == root || self.ancestors(id).iter().any(|t| t.id == root)
    }

    /// Look a topic up by id first, then by display name.
    pub fn resolve(&self, key: &str) -> Option<&Topic> {
        let key = key.trim();
        self.index
            .get(key)
            .or_else(|| self.topics().find(|t| t.name == key))
    }

    /// Display names of every topic, in reader order.
    pub fn names(&self) -> Vec<&str> {
        self.topics().map(|t| t.name.as_str()).collect()
    }
}
