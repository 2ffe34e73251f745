//! In-memory [`VectorStore`] for tests and offline runs.
//!
//! Brute-force cosine similarity over a `HashMap` behind `std::sync::RwLock`.

use crate::error::Result;
use crate::record::{SearchHit, VectorRecord};
use crate::store::VectorStore;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::RwLock;

pub struct InMemoryVectorStore {
    points: RwLock<HashMap<String, VectorRecord>>,
    created: AtomicBool,
}

impl InMemoryVectorStore {
    pub fn new() -> Self {
        Self {
            points: RwLock::new(HashMap::new()),
            created: AtomicBool::new(false),
        }
    }

    /// Number of stored points (test observability).
    pub fn len(&self) -> usize {
        self.points.read().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Ids currently stored (test observability).
    pub fn point_ids(&self) -> Vec<String> {
        let mut ids: Vec<String> = self.points.read().unwrap().keys().cloned().collect();
        ids.sort();
        ids
    }

    /// Ids stored for one file path (test observability).
    pub fn point_ids_for_file(&self, file_path: &str) -> Vec<String> {
        let mut ids: Vec<String> = self
            .points
            .read()
            .unwrap()
            .values()
            .filter(|r| r.payload.file_path == file_path)
            .map(|r| r.id.clone())
            .collect();
        ids.sort();
        ids
    }
}

impl Default for InMemoryVectorStore {
    fn default() -> Self {
        Self::new()
    }
}

fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a < f32::EPSILON || mag_b < f32::EPSILON {
        0.0
    } else {
        dot / (mag_a * mag_b)
    }
}

#[async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn initialize(&self) -> Result<bool> {
        Ok(!self.created.swap(true, Ordering::SeqCst))
    }

    async fn upsert_points(&self, records: &[VectorRecord]) -> Result<()> {
        let mut points = self.points.write().unwrap();
        for record in records {
            points.insert(record.id.clone(), record.clone());
        }
        Ok(())
    }

    async fn search(&self, vector: &[f32], limit: usize) -> Result<Vec<SearchHit>> {
        let points = self.points.read().unwrap();
        let mut hits: Vec<SearchHit> = points
            .values()
            .map(|record| SearchHit {
                file_path: record.payload.file_path.clone(),
                score: cosine_sim(vector, &record.vector),
                start_line: record.payload.start_line,
                end_line: record.payload.end_line,
                content: record.payload.content.clone(),
            })
            .collect();
        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(limit);
        Ok(hits)
    }

    async fn delete_points_by_file_path(&self, file_path: &str) -> Result<()> {
        let mut points = self.points.write().unwrap();
        points.retain(|_, record| record.payload.file_path != file_path);
        Ok(())
    }

    async fn delete_points_by_file_paths(&self, file_paths: &[String]) -> Result<()> {
        let mut points = self.points.write().unwrap();
        points.retain(|_, record| !file_paths.contains(&record.payload.file_path));
        Ok(())
    }

    async fn clear_collection(&self) -> Result<()> {
        self.points.write().unwrap().clear();
        Ok(())
    }

    async fn delete_collection(&self) -> Result<()> {
        self.points.write().unwrap().clear();
        self.created.store(false, Ordering::SeqCst);
        Ok(())
    }

    async fn collection_exists(&self) -> Result<bool> {
        Ok(self.created.load(Ordering::SeqCst))
    }
}
