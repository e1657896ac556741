//! Exchange metrics.
//!
//! # Metrics
//! - `upstream_interim_responses_discarded_total` (counter): by status code
//! - `upstream_upgrades_total` (counter): channels handed off after 101
//! - `upstream_ambiguous_upgrades_total` (counter): 101 without `Connection: upgrade`
//! - `upstream_connection_dispositions_total` (counter): by reuse / close / upgraded
//!
//! No exporter is installed here; without a recorder these are no-ops.

use http::StatusCode;
use metrics::counter;

use crate::http::disposition::Disposition;

pub fn record_interim_discarded(status: StatusCode) {
    counter!("upstream_interim_responses_discarded_total", "status" => status.as_str().to_owned())
        .increment(1);
}

pub fn record_upgrade() {
    counter!("upstream_upgrades_total").increment(1);
}

pub fn record_ambiguous_upgrade() {
    counter!("upstream_ambiguous_upgrades_total").increment(1);
}

pub fn record_disposition(disposition: &Disposition) {
    counter!("upstream_connection_dispositions_total", "disposition" => disposition.label())
        .increment(1);
}
