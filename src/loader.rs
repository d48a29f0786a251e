//! Bootstrap loaders for the item queue and proxy list.

use std::io::{self, BufRead};
use tracing::warn;

use crate::cli::LoadMode;
use crate::domain::parse_proxy;
use crate::error::Result;
use crate::store::StoreContext;

#[derive(Debug, Default, PartialEq, Eq)]
pub struct LoadSummary {
    pub added: u64,
    pub skipped: u64,
}

/// Prompts on stdin for append/overwrite when `mode` wasn't given on the
/// command line.
pub fn resolve_mode(mode: Option<LoadMode>) -> io::Result<LoadMode> {
    if let Some(mode) = mode {
        return Ok(mode);
    }
    println!("Select mode: 1) append  2) overwrite");
    let mut line = String::new();
    io::stdin().lock().read_line(&mut line)?;
    Ok(if line.trim() == "2" { LoadMode::Overwrite } else { LoadMode::Append })
}

/// Items loader: one decimal `item_id` per line, blanks ignored, non-integers
/// warned and skipped.
pub async fn load_tasks(
    store: &StoreContext,
    lines: impl Iterator<Item = String>,
    mode: LoadMode,
    max_attempts: i32,
) -> Result<LoadSummary> {
    let item_ids: Vec<i64> = lines
        .filter(|line| !line.trim().is_empty())
        .filter_map(|line| match line.trim().parse::<i64>() {
            Ok(id) => Some(id),
            Err(_) => {
                warn!(event = "loader_invalid_line", kind = "task", line = line.trim());
                None
            }
        })
        .collect();

    if mode == LoadMode::Overwrite {
        sqlx::query("DELETE FROM tasks").execute(store.pool()).await?;
    }

    let mut summary = LoadSummary::default();
    for item_id in item_ids {
        let result =
            sqlx::query("INSERT INTO tasks (item_id, max_attempts) VALUES ($1, $2) ON CONFLICT (item_id) DO NOTHING")
                .bind(item_id)
                .bind(max_attempts)
                .execute(store.pool())
                .await?;
        if result.rows_affected() > 0 {
            summary.added += 1;
        } else {
            summary.skipped += 1;
        }
    }
    Ok(summary)
}

/// Proxies loader: `host:port:user:pass` per line, blanks and `#`-comments
/// ignored, port validated in [1, 65535].
pub async fn load_proxies(store: &StoreContext, lines: impl Iterator<Item = String>, mode: LoadMode) -> Result<LoadSummary> {
    let proxies: Vec<String> = lines
        .filter(|line| !line.trim().is_empty() && !line.trim().starts_with('#'))
        .filter_map(|line| {
            let trimmed = line.trim();
            if !is_valid_proxy_line(trimmed) {
                warn!(event = "loader_invalid_line", kind = "proxy", line = trimmed);
                return None;
            }
            Some(trimmed.to_string())
        })
        .collect();

    if mode == LoadMode::Overwrite {
        sqlx::query("DELETE FROM proxies").execute(store.pool()).await?;
    }

    let mut summary = LoadSummary::default();
    for proxy in proxies {
        let result = sqlx::query("INSERT INTO proxies (proxy) VALUES ($1) ON CONFLICT (proxy) DO NOTHING")
            .bind(&proxy)
            .execute(store.pool())
            .await?;
        if result.rows_affected() > 0 {
            summary.added += 1;
        } else {
            summary.skipped += 1;
        }
    }
    Ok(summary)
}

fn is_valid_proxy_line(line: &str) -> bool {
    let Some(triple) = parse_proxy(line) else {
        return false;
    };
    let Some((_, port)) = triple.server.split_once(':') else {
        return false;
    };
    matches!(port.parse::<u32>(), Ok(p) if (1..=65535).contains(&p))
}
