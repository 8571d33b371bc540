//! Column-aligned tables written to stdout.

use std::io::{self, Write};

use crate::provider::{Cluster, Quotas};

const CLUSTER_HEADER: [&str; 5] = ["ClusterName", "Flavor", "Nodes", "AutoScale", "Status"];
const QUOTAS_HEADER: [&str; 2] = ["MaxClusters", "MaxNodesPerCluster"];
const COLUMN_GAP: usize = 2;

/// Write a header row followed by one row per cluster.
///
/// # Errors
///
/// Propagates write failures.
pub fn write_clusters<W: Write + ?Sized>(out: &mut W, clusters: &[Cluster]) -> io::Result<()> {
    let rows: Vec<Vec<String>> = clusters
        .iter()
        .map(|c| {
            vec![
                c.name.clone(),
                c.flavor.clone(),
                c.nodes.to_string(),
                c.autoscale.to_string(),
                c.status.to_string(),
            ]
        })
        .collect();
    write_table(out, &CLUSTER_HEADER, &rows)
}

/// Write a single cluster with its header.
///
/// # Errors
///
/// Propagates write failures.
pub fn write_cluster<W: Write + ?Sized>(out: &mut W, cluster: &Cluster) -> io::Result<()> {
    write_clusters(out, std::slice::from_ref(cluster))
}

/// Write the account's quotas.
///
/// # Errors
///
/// Propagates write failures.
pub fn write_quotas<W: Write + ?Sized>(out: &mut W, quotas: &Quotas) -> io::Result<()> {
    let row = vec![
        quotas.max_clusters.to_string(),
        quotas.max_nodes_per_cluster.to_string(),
    ];
    write_table(out, &QUOTAS_HEADER, &[row])
}

fn write_table<W: Write + ?Sized>(
    out: &mut W,
    header: &[&str],
    rows: &[Vec<String>],
) -> io::Result<()> {
    let mut widths: Vec<usize> = header.iter().map(|h| h.chars().count()).collect();
    for row in rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let header_row: Vec<String> = header.iter().map(|h| (*h).to_owned()).collect();
    for row in std::iter::once(&header_row).chain(rows) {
        let mut line = String::new();
        for (cell, width) in row.iter().zip(&widths) {
            let pad = width.saturating_sub(cell.chars().count()) + COLUMN_GAP;
            line.push_str(cell);
            line.extend(std::iter::repeat_n(' ', pad));
        }
        writeln!(out, "{}", line.trim_end())?;
    }
    Ok(())
}
