use rand::rngs::StdRng;
use rand::Rng;

/// Fisher-Yates over the whole slice.
pub(crate) fn shuffle_in_place<T>(rng: &mut StdRng, items: &mut [T]) {
    for i in (1..items.len()).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
}

/// Partial Fisher-Yates that only settles the last `k` positions and returns them.
pub(crate) fn select_tail<T: Clone>(rng: &mut StdRng, items: &mut [T], k: usize) -> Vec<T> {
    let n = items.len();
    let k = k.min(n);
    for i in (n - k..n).rev() {
        let j = rng.gen_range(0..=i);
        items.swap(i, j);
    }
    items[n - k..].to_vec()
}
