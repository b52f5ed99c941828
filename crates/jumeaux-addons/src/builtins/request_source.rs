//! Request sources: one input file in, requests out

use jumeaux_config::InputSource;
use jumeaux_core::{Request, StageCategory};
use serde::Deserialize;
use std::sync::Arc;

use crate::error::StageError;
use crate::registry::stage_config;
use crate::stage::{RequestSource, RequestStream, Stage};
use crate::StageRegistry;

pub const PLAIN: &str = "request_source/plain";
pub const CSV: &str = "request_source/csv";
pub const JSON: &str = "request_source/json";
pub const YAML: &str = "request_source/yaml";

pub fn register(registry: &StageRegistry) {
    registry.register(StageCategory::RequestSource, PLAIN, |_| {
        Ok(Stage::RequestSource(Arc::new(Plain)))
    });
    registry.register(StageCategory::RequestSource, CSV, |descriptor| {
        Ok(Stage::RequestSource(Arc::new(Csv {
            config: stage_config(descriptor)?,
        })))
    });
    registry.register(StageCategory::RequestSource, JSON, |_| {
        Ok(Stage::RequestSource(Arc::new(Json)))
    });
    registry.register(StageCategory::RequestSource, YAML, |_| {
        Ok(Stage::RequestSource(Arc::new(Yaml)))
    });
}

fn source_error(stage: &str, input: &InputSource, reason: impl ToString) -> StageError {
    StageError::Source {
        stage: stage.to_string(),
        path: input.path.clone(),
        reason: reason.to_string(),
    }
}

fn utf8<'a>(stage: &str, input: &'a InputSource) -> Result<&'a str, StageError> {
    std::str::from_utf8(&input.content).map_err(|e| source_error(stage, input, e))
}

fn failed<'a>(error: StageError) -> RequestStream<'a> {
    Box::new(std::iter::once(Err(error)))
}

/// One `path?query` per line; blank lines are skipped
pub struct Plain;

impl RequestSource for Plain {
    fn produce<'a>(&'a self, input: &'a InputSource) -> RequestStream<'a> {
        let text = match utf8(PLAIN, input) {
            Ok(text) => text,
            Err(e) => return failed(e),
        };

        Box::new(
            text.lines()
                .map(str::trim)
                .filter(|line| !line.is_empty())
                .map(|line| Ok(Request::from_path_and_query(line))),
        )
    }
}

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct CsvConfig {
    #[serde(default)]
    pub has_header: bool,
}

/// Columns `path, query[, name]`; the query column is urlencoded
pub struct Csv {
    config: CsvConfig,
}

impl RequestSource for Csv {
    fn produce<'a>(&'a self, input: &'a InputSource) -> RequestStream<'a> {
        let reader = csv::ReaderBuilder::new()
            .has_headers(self.config.has_header)
            .flexible(true)
            .from_reader(input.content.as_slice());

        Box::new(reader.into_records().map(move |record| {
            let record = record.map_err(|e| source_error(CSV, input, e))?;
            let path = record
                .get(0)
                .filter(|path| !path.is_empty())
                .ok_or_else(|| source_error(CSV, input, "row without a path column"))?;

            let mut request = Request::new(path).with_query_string(record.get(1).unwrap_or(""));
            if let Some(name) = record.get(2).filter(|name| !name.is_empty()) {
                request = request.with_name(name);
            }
            Ok(request)
        }))
    }
}

/// A JSON array of requests
pub struct Json;

impl RequestSource for Json {
    fn produce<'a>(&'a self, input: &'a InputSource) -> RequestStream<'a> {
        match serde_json::from_slice::<Vec<Request>>(&input.content) {
            Ok(requests) => Box::new(requests.into_iter().map(Ok)),
            Err(e) => failed(source_error(JSON, input, e)),
        }
    }
}

/// A YAML sequence of requests
pub struct Yaml;

impl RequestSource for Yaml {
    fn produce<'a>(&'a self, input: &'a InputSource) -> RequestStream<'a> {
        match serde_yaml::from_slice::<Vec<Request>>(&input.content) {
            Ok(requests) => Box::new(requests.into_iter().map(Ok)),
            Err(e) => failed(source_error(YAML, input, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn collect(source: &dyn RequestSource, content: &str) -> Vec<Request> {
        let input = InputSource::new("input", content);
        source
            .produce(&input)
            .collect::<Result<Vec<_>, _>>()
            .unwrap()
    }

    #[test]
    fn test_plain() {
        let requests = collect(&Plain, "/a?q=1&q=2\n\n  /b  \n");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].path, "/a");
        assert_eq!(requests[0].qs["q"], vec!["1", "2"]);
        assert_eq!(requests[1].path, "/b");
    }

    #[test]
    fn test_plain_rejects_invalid_utf8() {
        let input = InputSource::new("input", vec![0xff, 0xfe]);
        let result: Result<Vec<_>, _> = Plain.produce(&input).collect();
        assert!(matches!(result, Err(StageError::Source { .. })));
    }

    #[test]
    fn test_csv_with_header() {
        let source = Csv {
            config: CsvConfig { has_header: true },
        };
        let requests = collect(&source, "path,query,name\n/a,x=1&y=2,first\n/b,,\n");
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].name.as_deref(), Some("first"));
        assert_eq!(requests[0].qs["y"], vec!["2"]);
        assert_eq!(requests[1].name, None);
        assert!(requests[1].qs.is_empty());
    }

    #[test]
    fn test_csv_missing_path() {
        let source = Csv {
            config: CsvConfig::default(),
        };
        let input = InputSource::new("input", ",x=1\n");
        let result: Result<Vec<_>, _> = source.produce(&input).collect();
        assert!(result.is_err());
    }

    #[test]
    fn test_json() {
        let requests = collect(
            &Json,
            r#"[{"path": "/challenge", "qs": {"q1": ["1"], "q2": ["2-1", "2-2"]}, "name": "c"}]"#,
        );
        assert_eq!(requests[0].query_string(), "q1=1&q2=2-1&q2=2-2");
        assert_eq!(requests[0].name.as_deref(), Some("c"));
    }

    #[test]
    fn test_yaml() {
        let requests = collect(
            &Yaml,
            "- path: /a\n  headers:\n    x-id: \"1\"\n- path: /b\n",
        );
        assert_eq!(requests.len(), 2);
        assert_eq!(requests[0].headers["x-id"], "1");
    }
}
