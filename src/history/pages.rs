use std::ops::RangeInclusive;

use crate::indexer::HISTORY_PAGE_SIZE;

/// Epoch range with its upper bound clamped to `current_epoch`; `None` when
/// nothing of it has happened yet.
pub fn clamp_to_current(start: u64, end: u64, current_epoch: u64) -> Option<(u64, u64)> {
    let end = end.min(current_epoch);
    (start <= end).then_some((start, end))
}

/// Pages of a newest-first history listing that hold `[start, end]`.
///
/// Page `p` holds the epochs whose distance from `current_epoch` lies in
/// `[(p - 1) * 100, p * 100 - 1]`. Requires `start <= end <= current_epoch`.
pub fn page_range(current_epoch: u64, start: u64, end: u64) -> RangeInclusive<u64> {
    let distance_to_start = current_epoch - start;
    let distance_to_end = current_epoch - end.min(current_epoch);
    let start_page = distance_to_end / HISTORY_PAGE_SIZE + 1;
    let end_page = distance_to_start / HISTORY_PAGE_SIZE + 1;
    start_page..=end_page
}

/// Epochs listed on `pages`, oldest first, never above `current_epoch`.
pub fn epochs_on_pages(current_epoch: u64, pages: &RangeInclusive<u64>) -> RangeInclusive<u64> {
    let newest = current_epoch.saturating_sub((pages.start() - 1) * HISTORY_PAGE_SIZE);
    let oldest = (current_epoch + 1).saturating_sub(pages.end() * HISTORY_PAGE_SIZE);
    oldest..=newest
}
