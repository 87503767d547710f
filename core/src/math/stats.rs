pub struct StatsHelper;

impl StatsHelper {
    /// Index of the largest absolute sample; the first one wins ties.
    pub fn peak_index(samples: &[f64]) -> Option<usize> {
        samples
            .iter()
            .enumerate()
            .fold(None, |best: Option<(usize, f64)>, (idx, &value)| match best {
                Some((_, peak)) if peak >= value.abs() => best,
                _ => Some((idx, value.abs())),
            })
            .map(|(idx, _)| idx)
    }
}
