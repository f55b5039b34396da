//! End-to-end deck build for one request.
//!
//! Loading -> merging -> metric materialization -> annotation resolution ->
//! deck assembly, all within the request's own state. The caller receives
//! either a complete deck or a structured error; no partial deck is ever
//! produced.

use tracing::info;

use crate::db::{ConnectionsFile, ConnectorFactory};
use crate::error::{WbrError, WbrResult};
use crate::io::loaders::{
    fetch_text, load_annotation_csv, load_daily_csv, AnnotationRow,
};
use crate::models::config::{AnnotationsConfig, Config, SourceGroup, CSV_FILES_KEY};
use crate::models::deck::Deck;
use crate::models::frame::{DailyTable, DATE_COLUMN};
use crate::preprocessing::validator::ConfigValidator;
use crate::services::annotations::resolve_annotations;
use crate::services::deck::DeckBuilder;
use crate::services::metrics::MetricEngine;
use crate::transformations::merge::merge_sources;

/// Build a deck from raw YAML plus an optional uploaded CSV.
pub async fn build_deck_from_yaml(
    yaml: &str,
    uploaded_csv: Option<DailyTable>,
) -> WbrResult<Deck> {
    let cfg = Config::from_yaml_str(yaml)?;
    build_deck(&cfg, uploaded_csv).await
}

/// Build a deck from a parsed configuration.
///
/// When an uploaded CSV is present it replaces the entire merged table and
/// the YAML `dataSources` are ignored.
pub async fn build_deck(cfg: &Config, uploaded_csv: Option<DailyTable>) -> WbrResult<Deck> {
    ConfigValidator::validate(cfg).into_result()?;

    let mut connections: Option<ConnectionsFile> = None;

    let master = match uploaded_csv {
        Some(table) => {
            info!(rows = table.len(), "using uploaded CSV as the data source");
            table
        }
        None => load_master(cfg, &mut connections).await?,
    };

    let engine = MetricEngine::build(cfg, &master)?;

    let annotation_rows = load_annotation_rows(cfg, &mut connections).await?;
    let annotations =
        resolve_annotations(annotation_rows, engine.calendar(), |m| engine.is_defined(m));

    let deck = DeckBuilder::new(cfg, &engine, &annotations).build()?;
    info!(blocks = deck.blocks.len(), "deck built");
    Ok(deck)
}

/// Load and merge every declared source, in declaration order.
async fn load_master(
    cfg: &Config,
    connections: &mut Option<ConnectionsFile>,
) -> WbrResult<DailyTable> {
    let sources = cfg.data_sources.as_ref().ok_or_else(|| {
        WbrError::data(
            "no data source provided: declare dataSources in the config or upload a CSV",
        )
    })?;

    let mut loaded: Vec<(String, DailyTable)> = Vec::new();
    for (group_name, group) in sources.0.iter() {
        match group {
            SourceGroup::Csv(files) => {
                if group_name != CSV_FILES_KEY {
                    return Err(WbrError::config(
                        format!("dataSources.{}", group_name),
                        format!("CSV sources belong under the '{}' key", CSV_FILES_KEY),
                    ));
                }
                for (alias, source) in files.iter() {
                    let table = load_daily_csv(&source.url_or_path).await?;
                    info!(alias, rows = table.len(), "loaded CSV source");
                    loaded.push((alias.to_string(), table));
                }
            }
            SourceGroup::Queries(queries) => {
                let file = connections_for(cfg, connections).await?;
                let entry = file.get(group_name).ok_or_else(|| {
                    WbrError::config(
                        format!("dataSources.{}", group_name),
                        format!(
                            "connection '{}' is not declared in the connections file",
                            group_name
                        ),
                    )
                })?;
                let connector = ConnectorFactory::create(entry).await?;
                for (alias, source) in queries.iter() {
                    let table = connector.execute_query(&source.query).await?;
                    info!(alias, rows = table.len(), "loaded query source");
                    loaded.push((alias.to_string(), table));
                }
            }
        }
    }

    merge_sources(loaded)
}

async fn connections_for<'a>(
    cfg: &Config,
    cache: &'a mut Option<ConnectionsFile>,
) -> WbrResult<&'a ConnectionsFile> {
    if cache.is_none() {
        let url = cfg.setup.db_config_url.as_deref().ok_or_else(|| {
            WbrError::config(
                "setup.dbConfigUrl",
                "database sources are declared but no connections file is configured",
            )
        })?;
        let text = fetch_text(url).await?;
        *cache = Some(ConnectionsFile::parse(&text)?);
    }
    Ok(cache.as_ref().expect("just populated"))
}

/// Load annotation rows from every declared annotation source.
async fn load_annotation_rows(
    cfg: &Config,
    connections: &mut Option<ConnectionsFile>,
) -> WbrResult<Vec<AnnotationRow>> {
    let mut rows = Vec::new();
    match &cfg.annotations {
        None => {}
        Some(AnnotationsConfig::Files(files)) => {
            for location in files {
                rows.extend(load_annotation_csv(location).await?);
            }
        }
        Some(AnnotationsConfig::Sources {
            csv_files,
            data_sources,
        }) => {
            for location in csv_files {
                rows.extend(load_annotation_csv(location).await?);
            }
            for (connection_name, queries) in data_sources.iter() {
                let file = connections_for(cfg, connections).await?;
                let entry = file.get(connection_name).ok_or_else(|| {
                    WbrError::config(
                        format!("annotations.dataSources.{}", connection_name),
                        format!(
                            "connection '{}' is not declared in the connections file",
                            connection_name
                        ),
                    )
                })?;
                let connector = ConnectorFactory::create(entry).await?;
                for (alias, source) in queries.iter() {
                    let table = connector.execute_query(&source.query).await?;
                    rows.extend(annotation_rows_from_table(&table, alias)?);
                }
            }
        }
    }
    Ok(rows)
}

/// Convert a query result into annotation rows; the query must return
/// `Date`, `MetricName` and `EventDescription`.
fn annotation_rows_from_table(table: &DailyTable, alias: &str) -> WbrResult<Vec<AnnotationRow>> {
    let metric_names = table.text_column("MetricName").ok_or_else(|| {
        WbrError::data(format!(
            "annotation query '{}' must return columns {}, MetricName and EventDescription",
            alias, DATE_COLUMN
        ))
    })?;
    let descriptions = table.text_column("EventDescription").ok_or_else(|| {
        WbrError::data(format!(
            "annotation query '{}' must return an EventDescription column",
            alias
        ))
    })?;
    Ok(table
        .dates()
        .iter()
        .zip(metric_names.iter().zip(descriptions.iter()))
        .filter_map(|(date, (metric, description))| {
            match (metric, description) {
                (Some(metric), Some(description)) => Some(AnnotationRow {
                    date: *date,
                    metric_name: metric.clone(),
                    event_description: description.clone(),
                }),
                _ => None,
            }
        })
        .collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::frame::{Column, ColumnData};
    use crate::models::deck::Block;
    use chrono::{Duration, NaiveDate};

    fn date(y: i32, m: u32, d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(y, m, d).unwrap()
    }

    fn ramp_table(column: &str) -> DailyTable {
        let end = date(2021, 9, 25);
        let dates: Vec<NaiveDate> = (0..730).map(|i| end - Duration::days(729 - i)).collect();
        let values: Vec<Option<f64>> = (1..=730).map(|v| Some(v as f64)).collect();
        DailyTable::new(
            dates,
            vec![Column {
                name: column.to_string(),
                data: ColumnData::Float(values),
            }],
        )
        .unwrap()
    }

    const YAML: &str = r#"
setup:
  weekEnding: 25-SEP-2021
  weekNumber: 38
  title: Report
dataSources:
  csvFiles:
    ext:
      urlOrPath: /nonexistent/daily.csv
metrics:
  Impressions:
    column: Impressions
    aggf: sum
deck:
  - uiType: 6_12Graph
    title: Impressions
    metrics:
      Impressions: ~
"#;

    #[tokio::test]
    async fn test_uploaded_csv_overrides_data_sources() {
        // The declared CSV path does not exist; the upload must win without
        // ever touching it.
        let deck = build_deck_from_yaml(YAML, Some(ramp_table("Impressions")))
            .await
            .unwrap();
        assert_eq!(deck.blocks.len(), 1);
        let Block::Graph(chart) = &deck.blocks[0] else {
            panic!("expected graph");
        };
        assert!(chart.table.table_body[0][1].as_number().is_some());
    }

    #[tokio::test]
    async fn test_invalid_config_aborts_before_loading() {
        let yaml = YAML.replace("aggf: sum", "aggf: sum\n    metricComparisonMethod: bps")
            .replace("25-SEP-2021", "bad-date");
        let err = build_deck_from_yaml(&yaml, Some(ramp_table("Impressions")))
            .await
            .unwrap_err();
        assert_eq!(err.kind(), "config");
    }

    #[tokio::test]
    async fn test_missing_sources_without_upload() {
        let yaml = r#"
setup:
  weekEnding: 25-SEP-2021
metrics:
  Impressions:
    column: Impressions
    aggf: sum
deck: []
"#;
        let err = build_deck_from_yaml(yaml, None).await.unwrap_err();
        assert_eq!(err.kind(), "data");
    }

    #[test]
    fn test_annotation_rows_from_table() {
        let table = DailyTable::new(
            vec![date(2021, 9, 8), date(2021, 9, 9)],
            vec![
                Column {
                    name: "MetricName".into(),
                    data: ColumnData::Text(vec![Some("Clicks".into()), None]),
                },
                Column {
                    name: "EventDescription".into(),
                    data: ColumnData::Text(vec![Some("Launch".into()), Some("skipped".into())]),
                },
            ],
        )
        .unwrap();
        let rows = annotation_rows_from_table(&table, "notes").unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].metric_name, "Clicks");
    }
}
