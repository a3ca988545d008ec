//! DAG validation, topological ordering, and projection onto the set of
//! acyclic matrices.

use dagfit_error::DagFitError;
use ndarray::{Array2, ArrayView2};
use petgraph::algo::{tarjan_scc, toposort};
use petgraph::graph::{DiGraph, NodeIndex};
use tracing::debug;

fn build_digraph(w: &ArrayView2<f64>) -> DiGraph<(), f64> {
    let d = w.nrows();
    let mut g = DiGraph::<(), f64>::with_capacity(d, d);
    let nodes: Vec<NodeIndex> = (0..d).map(|_| g.add_node(())).collect();
    for i in 0..d {
        for j in 0..d {
            let wij = w[[i, j]];
            if wij != 0.0 {
                g.add_edge(nodes[i], nodes[j], wij);
            }
        }
    }
    g
}

/// Returns true iff the directed graph induced by nonzero entries of `w`
/// is acyclic. A nonzero diagonal entry is a self-loop and therefore a
/// cycle. Deterministic, O(d^2) in the matrix size.
pub fn is_dag(w: &ArrayView2<f64>) -> bool {
    if w.nrows() != w.ncols() {
        return false;
    }
    for i in 0..w.nrows() {
        if w[[i, i]] != 0.0 {
            return false;
        }
    }
    toposort(&build_digraph(w), None).is_ok()
}

/// Computes a topological ordering of the variables of `w`.
///
/// Any valid order is acceptable when several exist; the order returned is
/// deterministic for a given matrix. Fails with `InvalidGraph` when `w` is
/// not square or contains a directed cycle.
pub fn topological_order(w: &ArrayView2<f64>) -> Result<Vec<usize>, DagFitError> {
    let d = w.nrows();
    if w.ncols() != d {
        return Err(DagFitError::dimension_mismatch(
            "adjacency matrix columns",
            d,
            w.ncols(),
        ));
    }
    for i in 0..d {
        if w[[i, i]] != 0.0 {
            return Err(DagFitError::invalid_graph(format!(
                "self-loop at variable {i}"
            )));
        }
    }
    let order: Vec<usize> = toposort(&build_digraph(w), None)
        .map_err(|cycle| {
            DagFitError::invalid_graph(format!(
                "cycle through variable {}",
                cycle.node_id().index()
            ))
        })?
        .into_iter()
        .map(|n| n.index())
        .collect();
    // Defensive double-check: the sort must cover every variable.
    if order.len() != d {
        return Err(DagFitError::invalid_graph(format!(
            "topological sort covered {} of {} variables",
            order.len(),
            d
        )));
    }
    Ok(order)
}

/// Edges currently participating in some directed cycle: self-loops, plus
/// any edge whose endpoints share a nontrivial strongly connected component.
fn cycle_edges(w: &ArrayView2<f64>) -> Vec<(usize, usize)> {
    let d = w.nrows();
    let sccs = tarjan_scc(&build_digraph(w));
    let mut component = vec![0usize; d];
    let mut component_len = vec![0usize; d];
    for (ci, members) in sccs.iter().enumerate() {
        for n in members {
            component[n.index()] = ci;
            component_len[n.index()] = members.len();
        }
    }
    let mut edges = Vec::new();
    for i in 0..d {
        for j in 0..d {
            if w[[i, j]] == 0.0 {
                continue;
            }
            if i == j || (component[i] == component[j] && component_len[i] > 1) {
                edges.push((i, j));
            }
        }
    }
    edges
}

/// Projects `w` onto the set of acyclic matrices by greedy edge removal:
/// among all edges participating in a cycle, the one with the smallest
/// absolute weight is zeroed, cycle membership is recomputed, and the
/// process repeats until the matrix is acyclic.
///
/// Ties on absolute weight are broken by row-major index, so the projection
/// is reproducible. Entries not involved in any cycle are never modified,
/// and already-acyclic input is returned unchanged.
pub fn project_to_dag(w: &ArrayView2<f64>) -> Array2<f64> {
    let mut out = w.to_owned();
    let mut removed = 0usize;
    loop {
        let candidates = cycle_edges(&out.view());
        if candidates.is_empty() {
            break;
        }
        let mut best = candidates[0];
        for &(i, j) in &candidates[1..] {
            if out[[i, j]].abs() < out[[best.0, best.1]].abs() {
                best = (i, j);
            }
        }
        debug!(
            from = best.0,
            to = best.1,
            weight = out[[best.0, best.1]],
            "projection removing cycle edge"
        );
        out[[best.0, best.1]] = 0.0;
        removed += 1;
    }
    if removed > 0 {
        debug!(removed, "projected matrix onto DAG set");
    }
    out
}
