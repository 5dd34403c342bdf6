//! `askwise vars`: Hydrate user-data variables without invoking a model.

use super::pipeline::{self, CliResult};
use askwise_config::AppConfig;
use askwise_hydration::DateWindow;
use chrono::{Local, NaiveDate};

pub async fn run(
    user_token: &str,
    names: &[String],
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    use_cache: bool,
) -> CliResult<()> {
    let config = AppConfig::load().map_err(|e| format!("Failed to load config: {e}"))?;
    let window = window(from, to, config.hydration.default_window_days)?;
    let engine = pipeline::engine(&config).await?;

    let values = engine.resolve(user_token, names, window, use_cache).await;
    println!("{}", serde_json::to_string_pretty(&values)?);
    Ok(())
}

/// Window from optional bounds. A missing `to` is today; a missing `from`
/// is `default_days` back from `to`.
fn window(
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    default_days: u32,
) -> CliResult<Option<DateWindow>> {
    let window = match (from, to) {
        (None, None) => return Ok(None),
        (Some(from), to) => DateWindow::new(from, to.unwrap_or_else(|| Local::now().date_naive())),
        (None, Some(to)) => DateWindow::ending_at(to, default_days),
    };
    if window.from > window.to {
        return Err(format!("--from {} is after --to {}", window.from, window.to).into());
    }
    Ok(Some(window))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn date(s: &str) -> NaiveDate {
        s.parse().unwrap()
    }

    #[test]
    fn no_bounds_uses_engine_default() {
        assert!(window(None, None, 7).unwrap().is_none());
    }

    #[test]
    fn explicit_bounds_are_kept() {
        let w = window(Some(date("2024-03-01")), Some(date("2024-03-07")), 7)
            .unwrap()
            .unwrap();
        assert_eq!(w.from, date("2024-03-01"));
        assert_eq!(w.to, date("2024-03-07"));
    }

    #[test]
    fn reversed_bounds_are_rejected() {
        assert!(window(Some(date("2024-03-07")), Some(date("2024-03-01")), 7).is_err());
    }
}
