// SPDX-License-Identifier: MIT
// SPDX-FileCopyrightText: 2026 ® John Hauger Mitander <john@mitander.dev>

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

const MIGRATIONS_DIR: &str = "migrations";

fn migration_files() -> Vec<PathBuf> {
    let mut files: Vec<_> = fs::read_dir(Path::new(MIGRATIONS_DIR))
        .expect("read migrations dir")
        .filter_map(Result::ok)
        .map(|entry| entry.path())
        .filter(|p| p.extension().and_then(|s| s.to_str()) == Some("sql"))
        .collect();
    files.sort();
    files
}

fn normalize_ident(raw: &str) -> String {
    raw.trim_matches(|c: char| c == '"' || c == '\'' || c == '`' || c == ';' || c == '(')
        .to_lowercase()
}

/// DDL target of a single statement line, e.g. `table:trades` or
/// `index:idx_trades_subject`. Targets must be created exactly once
/// across the whole migration chain.
fn ddl_target(line: &str) -> Option<String> {
    let tokens: Vec<String> = line
        .split_whitespace()
        .map(|t| t.to_lowercase())
        .collect();
    if tokens.len() < 3 || tokens[0] != "create" {
        return None;
    }

    let (kind, mut idx) = match tokens[1].as_str() {
        "table" => ("table", 2),
        "index" => ("index", 2),
        "unique" => ("index", 3),
        _ => return None,
    };
    if tokens.get(idx).map(String::as_str) == Some("if") {
        // IF NOT EXISTS
        idx += 3;
    }
    tokens
        .get(idx)
        .map(|name| format!("{}:{}", kind, normalize_ident(name)))
}

/// Column names inside a `CREATE TABLE ... ( ... );` block, assuming the
/// one-column-per-line layout used in this repo.
fn table_columns(sql: &str, table: &str) -> Vec<String> {
    let lower = sql.to_lowercase();
    let marker = format!("create table if not exists {} (", table);
    let start = match lower.find(&marker) {
        Some(pos) => pos + marker.len(),
        None => panic!("no CREATE TABLE for {}", table),
    };
    let end = lower[start..].find(");").expect("unterminated create table") + start;

    lower[start..end]
        .lines()
        .filter_map(|line| line.split_whitespace().next())
        .map(normalize_ident)
        .filter(|ident| !ident.is_empty())
        .collect()
}

#[test]
fn migration_files_follow_the_versioned_naming_scheme() {
    let files = migration_files();
    assert!(!files.is_empty(), "no migrations found");

    for path in files {
        let name = path
            .file_stem()
            .and_then(|n| n.to_str())
            .expect("migration file name");
        let (version, description) = name
            .split_once('_')
            .unwrap_or_else(|| panic!("{} lacks a version prefix", name));
        assert!(
            version.len() >= 14 && version.chars().all(|c| c.is_ascii_digit()),
            "{} version prefix is not a timestamp",
            name
        );
        assert!(!description.is_empty(), "{} lacks a description", name);
    }
}

#[test]
fn ddl_targets_are_not_duplicated_across_migrations() {
    let mut seen: BTreeMap<String, Vec<String>> = BTreeMap::new();
    for path in migration_files() {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .unwrap_or("unknown.sql")
            .to_string();
        let sql = fs::read_to_string(&path).expect("read migration");
        for raw_line in sql.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with("--") {
                continue;
            }
            if let Some(target) = ddl_target(line) {
                seen.entry(target).or_default().push(file_name.clone());
            }
        }
    }

    let duplicates: Vec<_> = seen.iter().filter(|(_, files)| files.len() > 1).collect();
    assert!(
        duplicates.is_empty(),
        "duplicate DDL targets: {:?}",
        duplicates
    );
}

#[test]
fn schema_covers_every_column_the_queries_bind() {
    let mut sql = String::new();
    for path in migration_files() {
        sql.push_str(&fs::read_to_string(&path).expect("read migration"));
        sql.push('\n');
    }

    let trades = table_columns(&sql, "trades");
    for column in [
        "transaction_hash",
        "trader",
        "subject",
        "is_buy",
        "share_amount",
        "eth_amount",
        "protocol_eth_amount",
        "subject_eth_amount",
        "supply",
        "block_number",
        "timestamp",
        "created_at",
    ] {
        assert!(
            trades.contains(&column.to_string()),
            "trades.{} missing",
            column
        );
    }

    let shares = table_columns(&sql, "shares");
    for column in [
        "address",
        "twitter_username",
        "twitter_name",
        "twitter_score",
        "registered",
        "last_transaction",
        "balance",
        "buy_price",
        "sell_price",
        "supply",
        "rank",
    ] {
        assert!(
            shares.contains(&column.to_string()),
            "shares.{} missing",
            column
        );
    }
}
