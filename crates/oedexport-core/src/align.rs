use crate::models::ExportDataSet;

/// Orders a dataset's points ascending by timestamp.
///
/// `sort_by_key` is stable, so points sharing a timestamp keep the order they
/// arrived in.
pub fn align_dataset(dataset: &mut ExportDataSet) {
    dataset.export_vals.sort_by_key(|p| p.x);
}

pub fn is_aligned(dataset: &ExportDataSet) -> bool {
    dataset.export_vals.windows(2).all(|w| w[0].x <= w[1].x)
}
