//! The in-memory graph of one Document.
//!
//! A [`Graph`] keeps its triples as an ordered mapping from a
//! `(subject, predicate)` key to the list of objects asserted for it. Keys are
//! kept in first-insertion order and so are the objects under each key, which
//! is the order the serializers print them in. Duplicate triples collapse.

use core::hash::BuildHasherDefault;
use std::collections::HashMap;
use std::collections::hash_map::Entry;
use seahash::SeaHasher;

use crate::term::{Term, Triple};

// we will use a fast hashing algo for the key index
pub type KeyHasher = BuildHasherDefault<SeaHasher>;

pub type Key = (Term, Term);

#[derive(Debug, Clone, Default)]
pub struct Graph {
    keys: Vec<Key>,
    objects: HashMap<Key, Vec<Term>, KeyHasher>,
    length: usize,
}

impl Graph {
    pub fn new() -> Self {
        Self::default()
    }
    pub fn from_triples(triples: impl IntoIterator<Item = Triple>) -> Self {
        let mut graph = Self::new();
        for triple in triples {
            graph.insert(triple);
        }
        graph
    }
    pub fn len(&self) -> usize {
        self.length
    }
    pub fn is_empty(&self) -> bool {
        self.length == 0
    }
    pub fn contains(&self, triple: &Triple) -> bool {
        let key = (triple.subject.clone(), triple.predicate.clone());
        self.objects
            .get(&key)
            .is_some_and(|objects| objects.contains(&triple.object))
    }
    /// Adds a triple, returning false when it was already present.
    pub fn insert(&mut self, triple: Triple) -> bool {
        let key = (triple.subject, triple.predicate);
        match self.objects.entry(key) {
            Entry::Occupied(mut entry) => {
                if entry.get().contains(&triple.object) {
                    return false;
                }
                entry.get_mut().push(triple.object);
            }
            Entry::Vacant(entry) => {
                self.keys.push(entry.key().clone());
                entry.insert(vec![triple.object]);
            }
        }
        self.length += 1;
        true
    }
    /// Removes a triple, returning false when it was absent.
    pub fn remove(&mut self, triple: &Triple) -> bool {
        let key = (triple.subject.clone(), triple.predicate.clone());
        let Some(objects) = self.objects.get_mut(&key) else {
            return false;
        };
        let Some(position) = objects.iter().position(|o| *o == triple.object) else {
            return false;
        };
        objects.remove(position);
        self.length -= 1;
        if objects.is_empty() {
            self.objects.remove(&key);
            self.keys.retain(|k| *k != key);
        }
        true
    }
    /// Unions another graph into this one. New keys land after existing ones.
    pub fn merge(&mut self, other: Graph) {
        for triple in other.into_triples() {
            self.insert(triple);
        }
    }
    /// Overwrites every object of a subject and predicate with the given list.
    /// An empty list drops the key.
    pub fn replace_objects(&mut self, subject: Term, predicate: Term, objects: Vec<Term>) {
        let key = (subject, predicate);
        if let Some(previous) = self.objects.remove(&key) {
            self.length -= previous.len();
        } else if !objects.is_empty() {
            self.keys.push(key.clone());
        }
        let mut kept: Vec<Term> = Vec::with_capacity(objects.len());
        for object in objects {
            if !kept.contains(&object) {
                kept.push(object);
            }
        }
        if kept.is_empty() {
            self.keys.retain(|k| *k != key);
        } else {
            self.length += kept.len();
            self.objects.insert(key, kept);
        }
    }
    pub fn objects(&self, subject: &Term, predicate: &Term) -> &[Term] {
        self.objects
            .get(&(subject.clone(), predicate.clone()))
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
    /// Keys in first-insertion order.
    pub fn keys(&self) -> impl Iterator<Item = (&Key, &[Term])> {
        self.keys
            .iter()
            .filter_map(|key| self.objects.get(key).map(|objects| (key, objects.as_slice())))
    }
    /// Triples in insertion order of their keys, objects in assertion order.
    pub fn triples(&self) -> impl Iterator<Item = Triple> + '_ {
        self.keys().flat_map(|((subject, predicate), objects)| {
            objects
                .iter()
                .map(move |object| Triple::new(subject.clone(), predicate.clone(), object.clone()))
        })
    }
    pub fn into_triples(self) -> Vec<Triple> {
        self.triples().collect()
    }
    /// Subjects in order of first appearance, each with its predicates in key order.
    pub fn subjects(&self) -> Vec<(&Term, Vec<(&Term, &[Term])>)> {
        let mut order: Vec<&Term> = Vec::new();
        let mut grouped: HashMap<&Term, Vec<(&Term, &[Term])>, KeyHasher> = HashMap::default();
        for ((subject, predicate), objects) in self.keys() {
            let predicates = grouped.entry(subject).or_insert_with(|| {
                order.push(subject);
                Vec::new()
            });
            predicates.push((predicate, objects));
        }
        order
            .into_iter()
            .map(|subject| {
                let predicates = grouped.remove(subject).unwrap_or_default();
                (subject, predicates)
            })
            .collect()
    }
}

/// Structural equality on the triple set, ignoring order.
impl PartialEq for Graph {
    fn eq(&self, other: &Self) -> bool {
        self.length == other.length && self.triples().all(|triple| other.contains(&triple))
    }
}
impl Eq for Graph {}
