//! Similarity index tests with a deterministic bag-of-words backend.

use async_trait::async_trait;
use edgequake_slides::embeddings::{text_hash, EmbeddingCache, IndexStats};
use edgequake_slides::{
    cosine_similarity, ContentBlock, EmbeddingBackend, EmbeddingError, EmbeddingTask,
    SimilarityIndex, SlideExtraction,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

const VOCAB: [&str; 4] = ["alpha", "beta", "gamma", "delta"];

/// Counts vocabulary words; text containing "broken" fails.
#[derive(Default)]
struct BagOfWords {
    calls: AtomicUsize,
    tasks: Mutex<Vec<EmbeddingTask>>,
}

#[async_trait]
impl EmbeddingBackend for BagOfWords {
    fn name(&self) -> &str {
        "bag-of-words"
    }

    async fn embed(&self, text: &str, task: EmbeddingTask) -> Result<Vec<f32>, EmbeddingError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.tasks.lock().unwrap().push(task);
        if text.contains("broken") {
            return Err(EmbeddingError::Status {
                status: 500,
                body: "boom".into(),
            });
        }
        let mut v = vec![0.0f32; VOCAB.len()];
        for word in text.split_whitespace() {
            let word = word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase();
            if let Some(i) = VOCAB.iter().position(|w| *w == word) {
                v[i] += 1.0;
            }
        }
        Ok(v)
    }
}

fn slide(ordinal: usize, text: &str) -> SlideExtraction {
    SlideExtraction {
        id: format!("s{ordinal}"),
        ordinal,
        title: String::new(),
        layout: String::new(),
        notes: String::new(),
        content: vec![ContentBlock::paragraph(text).unwrap()],
    }
}

fn deck() -> Vec<SlideExtraction> {
    vec![
        slide(1, "alpha alpha"),
        slide(2, "alpha beta"),
        slide(3, "gamma"),
        slide(4, "alpha"),
        slide(5, "alpha beta"),
    ]
}

fn index_with(backend: Arc<BagOfWords>) -> SimilarityIndex {
    let index = SimilarityIndex::new(backend, 8000);
    index.upsert_slides(deck());
    index
}

fn ids(hits: &[edgequake_slides::SimilarSlide]) -> Vec<&str> {
    hits.iter().map(|h| h.slide_id.as_str()).collect()
}

#[tokio::test]
async fn ranks_by_score_then_ordinal_and_truncates() {
    let backend = Arc::new(BagOfWords::default());
    let index = index_with(backend);
    index.index_all(2).await;

    let hits = index.find_similar("s1", 3).await.unwrap();
    assert_eq!(ids(&hits), vec!["s4", "s2", "s5"]);
    assert!((hits[0].score - 1.0).abs() < 1e-6);
    assert_eq!(hits[1].score, hits[2].score);
    assert!((hits[1].score - std::f32::consts::FRAC_1_SQRT_2).abs() < 1e-6);

    let all = index.find_similar("s1", 10).await.unwrap();
    assert_eq!(all.len(), 4, "target itself is never a candidate");
    assert_eq!(all.last().unwrap().slide_id, "s3");
    assert_eq!(all.last().unwrap().score, 0.0);

    assert!(index.find_similar("s1", 0).await.unwrap().is_empty());
}

#[tokio::test]
async fn cached_vectors_are_reused() {
    let backend = Arc::new(BagOfWords::default());
    let index = index_with(backend.clone());

    let first = index.index_all(3).await;
    assert_eq!(
        first,
        IndexStats {
            embedded: 5,
            cached: 0,
            failed: 0
        }
    );
    let second = index.index_all(3).await;
    assert_eq!(second.cached, 5);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 5);

    index.find_similar("s2", 2).await.unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
}

#[tokio::test]
async fn changed_text_is_re_embedded() {
    let backend = Arc::new(BagOfWords::default());
    let index = index_with(backend.clone());
    index.index_all(1).await;
    let before = index.record("s3").unwrap();

    index.upsert_slides([slide(3, "alpha alpha alpha")]);
    // The stale record stays visible until the slide is used.
    assert_eq!(index.record("s3").unwrap().text_hash, before.text_hash);

    let hits = index.find_similar("s1", 1).await.unwrap();
    assert_eq!(backend.calls.load(Ordering::SeqCst), 6);
    let after = index.record("s3").unwrap();
    assert_ne!(after.text_hash, before.text_hash);
    assert_eq!(after.text_hash, text_hash("alpha alpha alpha"));
    // s3 now ties s4 at 1.0 and wins on ordinal.
    assert_eq!(ids(&hits), vec!["s3"]);
}

#[tokio::test]
async fn search_embeds_query_as_query() {
    let backend = Arc::new(BagOfWords::default());
    let index = index_with(backend.clone());
    index.index_all(4).await;

    let hits = index.search("gamma please", 1).await.unwrap();
    assert_eq!(ids(&hits), vec!["s3"]);
    let tasks = backend.tasks.lock().unwrap();
    assert_eq!(tasks.last(), Some(&EmbeddingTask::Query));
    assert_eq!(
        tasks.iter().filter(|t| **t == EmbeddingTask::Document).count(),
        5
    );
}

#[tokio::test]
async fn failures_are_counted_and_unknown_slides_rejected() {
    let backend = Arc::new(BagOfWords::default());
    let index = index_with(backend);
    index.upsert_slides([slide(6, "broken slide")]);

    let stats = index.index_all(2).await;
    assert_eq!(stats.embedded, 5);
    assert_eq!(stats.failed, 1);
    assert!(index.record("s6").is_none());

    assert!(matches!(
        index.find_similar("nope", 3).await,
        Err(EmbeddingError::UnknownSlide(_))
    ));

    index.remove_slide("s4");
    assert_eq!(index.len(), 5);
    let hits = index.find_similar("s1", 10).await.unwrap();
    assert!(!ids(&hits).contains(&"s4"));
}

#[tokio::test]
async fn first_query_embeds_every_candidate() {
    let backend = Arc::new(BagOfWords::default());
    let index = index_with(backend.clone());

    let hits = index.find_similar("s1", 3).await.unwrap();
    assert_eq!(ids(&hits), vec!["s4", "s2", "s5"]);
    assert_eq!(backend.calls.load(Ordering::SeqCst), 5);
    assert!(index.record("s3").is_some());

    let fresh = index_with(Arc::new(BagOfWords::default()));
    let hits = fresh.search("gamma", 1).await.unwrap();
    assert_eq!(ids(&hits), vec!["s3"]);
}

#[tokio::test]
async fn failing_candidate_is_left_out_of_the_ranking() {
    let backend = Arc::new(BagOfWords::default());
    let index = index_with(backend).with_concurrency(2);
    index.upsert_slides([slide(6, "broken alpha")]);

    let hits = index.find_similar("s1", 10).await.unwrap();
    assert_eq!(hits.len(), 4);
    assert!(!ids(&hits).contains(&"s6"));
    assert!(index.record("s6").is_none());

    assert!(matches!(
        index.find_similar("s6", 3).await,
        Err(EmbeddingError::Status { status: 500, .. })
    ));
}

#[tokio::test]
async fn exported_cache_spares_a_new_index_from_re_embedding() {
    let first = index_with(Arc::new(BagOfWords::default()));
    first.index_all(2).await;
    let cache = first.export_cache();
    assert_eq!(cache.model, "bag-of-words");
    assert_eq!(cache.records.len(), 5);
    assert_eq!(cache.records[0].slide_id, "s1");

    let json = serde_json::to_string(&cache).unwrap();
    let reloaded: EmbeddingCache = serde_json::from_str(&json).unwrap();

    let backend = Arc::new(BagOfWords::default());
    let second = index_with(backend.clone());
    second.upsert_slides([slide(2, "delta")]);
    assert_eq!(second.import_cache(reloaded), 5);

    let stats = second.index_all(2).await;
    assert_eq!((stats.embedded, stats.cached), (1, 4));
    assert_eq!(backend.calls.load(Ordering::SeqCst), 1);

    let other_model = EmbeddingCache {
        model: "something-else".into(),
        records: cache.records,
    };
    assert_eq!(index_with(backend).import_cache(other_model), 0);
}

#[test]
fn similarity_properties() {
    let vectors: [&[f32]; 4] = [
        &[1.0, 2.0, 3.0],
        &[-0.5, 0.25, 8.0],
        &[1e-3, 0.0, -2.0],
        &[3.0, 3.0, 3.0],
    ];
    for a in vectors {
        assert!((cosine_similarity(a, a) - 1.0).abs() < 1e-6);
        let neg: Vec<f32> = a.iter().map(|x| -x).collect();
        assert!((cosine_similarity(a, &neg) + 1.0).abs() < 1e-6);
        for b in vectors {
            assert_eq!(cosine_similarity(a, b), cosine_similarity(b, a));
        }
    }
}
