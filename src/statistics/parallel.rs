//! Row-parallel evaluation of ensemble statistics
//!
//! Every statistic is a function of one timestamp's members only, so rows are
//! evaluated independently on the rayon pool and reassembled in index order.

use crate::errors::Result;
use ndarray::Array2;
use rayon::prelude::*;

/// Applies `row_fn` to the present members of every row in parallel
///
/// `row_fn` receives only the non-missing values of a row and must return
/// exactly `width` statistics. Rows where no member reported yield `width`
/// absent (`NaN`) values without calling `row_fn`.
///
/// # Errors
///
/// Returns the first error produced by `row_fn`, or an array error if a row
/// returned the wrong number of statistics.
pub fn map_rows<F>(values: &Array2<f64>, width: usize, row_fn: F) -> Result<Array2<f64>>
where
    F: Fn(&[f64]) -> Result<Vec<f64>> + Sync + Send,
{
    let n_rows = values.nrows();

    tracing::trace!(
        rows = n_rows,
        threads = rayon::current_num_threads(),
        "evaluating row statistics"
    );

    let rows: Vec<Vec<f64>> = (0..n_rows)
        .into_par_iter()
        .map(|row| {
            let present: Vec<f64> = values
                .row(row)
                .iter()
                .copied()
                .filter(|v| !v.is_nan())
                .collect();

            if present.is_empty() {
                Ok(vec![f64::NAN; width])
            } else {
                row_fn(&present)
            }
        })
        .collect::<Result<Vec<_>>>()?;

    let flat: Vec<f64> = rows.into_iter().flatten().collect();
    Ok(Array2::from_shape_vec((n_rows, width), flat)?)
}

/// Fraction of `members` for which `predicate` holds
pub(crate) fn fraction<F>(members: &[f64], predicate: F) -> f64
where
    F: Fn(f64) -> bool,
{
    let hits = members.iter().filter(|&&v| predicate(v)).count();
    hits as f64 / members.len() as f64
}
