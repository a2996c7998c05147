use rand::{rngs::StdRng, Rng, SeedableRng};

/// Balanced class weights, `n_samples / (n_classes * count)`. Classes with no
/// samples get a weight of zero.
pub fn class_weights(counts: &[usize]) -> Vec<f32> {
    let total: usize = counts.iter().sum();
    let n_classes = counts.len();

    counts
        .iter()
        .map(|&count| {
            if count == 0 {
                0.0
            } else {
                total as f32 / (n_classes * count) as f32
            }
        })
        .collect()
}

/// Indices into `labels` that bring every class up to the size of the largest
/// one. Originals are kept in order, duplicates are drawn with replacement from
/// a seeded generator and appended per class.
pub fn oversample(labels: &[usize], n_classes: usize, seed: u64) -> Vec<usize> {
    let mut by_class: Vec<Vec<usize>> = vec![Vec::new(); n_classes];
    for (index, &class) in labels.iter().enumerate() {
        by_class[class].push(index);
    }

    let target = by_class.iter().map(Vec::len).max().unwrap_or(0);
    let mut rng = StdRng::seed_from_u64(seed);
    let mut plan: Vec<usize> = (0..labels.len()).collect();

    for members in &by_class {
        if members.is_empty() {
            continue;
        }
        for _ in members.len()..target {
            plan.push(members[rng.random_range(0..members.len())]);
        }
    }

    plan
}
