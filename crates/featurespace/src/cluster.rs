use std::collections::BTreeSet;

use advbid_protocol::WordMultiset;
use ndarray::Array1;

use crate::submission::Submission;

/// Groups near-identical final candidates and keeps the lowest-loss
/// representative per cluster, so a human reviewer gets diverse options
/// instead of `beam_width` variations of the same edit.
///
/// Agglomerative, average linkage, euclidean distance over the
/// modified-word count vectors.
pub fn cluster_representatives<F>(
    submissions: Vec<Submission>,
    n_clusters: usize,
    loss: F,
) -> Vec<Submission>
where
    F: Fn(&WordMultiset) -> f64,
{
    let n_clusters = n_clusters.max(1);
    if submissions.len() <= n_clusters {
        return submissions;
    }

    let deltas: Vec<_> = submissions
        .iter()
        .map(|s| s.modified_words(false))
        .collect();
    let vocabulary: Vec<&String> = deltas
        .iter()
        .flat_map(|delta| delta.keys())
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();
    let vectors: Vec<Array1<f64>> = deltas
        .iter()
        .map(|delta| {
            Array1::from_iter(
                vocabulary
                    .iter()
                    .map(|word| delta.get(*word).copied().unwrap_or(0) as f64),
            )
        })
        .collect();

    let mut clusters: Vec<Vec<usize>> = (0..submissions.len()).map(|i| vec![i]).collect();
    while clusters.len() > n_clusters {
        let mut best: Option<(usize, usize, f64)> = None;
        for a in 0..clusters.len() {
            for b in (a + 1)..clusters.len() {
                let distance = average_linkage(&clusters[a], &clusters[b], &vectors);
                if best.map_or(true, |(_, _, d)| distance < d) {
                    best = Some((a, b, distance));
                }
            }
        }
        // a < b, so a stays valid after the swap_remove.
        let (a, b, _) = best.expect("at least two clusters");
        let merged = clusters.swap_remove(b);
        clusters[a].extend(merged);
    }

    let mut representatives = Vec::with_capacity(clusters.len());
    for cluster in clusters {
        let best = cluster
            .into_iter()
            .min_by(|&a, &b| {
                loss(&submissions[a].words_cnt()).total_cmp(&loss(&submissions[b].words_cnt()))
            })
            .expect("non-empty cluster");
        representatives.push(submissions[best].clone());
    }
    representatives
}

fn average_linkage(a: &[usize], b: &[usize], vectors: &[Array1<f64>]) -> f64 {
    let mut total = 0.0;
    for &i in a {
        for &j in b {
            let diff = &vectors[i] - &vectors[j];
            total += diff.dot(&diff).sqrt();
        }
    }
    total / (a.len() * b.len()) as f64
}
