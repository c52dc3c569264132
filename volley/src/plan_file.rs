use std::path::Path;
use std::time::Duration;

use anyhow::Context as _;
use serde::Deserialize;
use volley_core::runner::{Pattern, Phase, Plan, WorkerGroup};

#[derive(Debug, Default, Deserialize)]
#[serde(deny_unknown_fields)]
struct PlanFile {
    #[serde(default)]
    pattern: Option<String>,

    #[serde(default)]
    phases: Vec<PhaseFile>,
}

#[derive(Debug, Default, Deserialize)]
struct PhaseFile {
    #[serde(default)]
    name: String,

    #[serde(default)]
    client: ClientFile,

    /// Action payloads are opaque and sent to the target as-is.
    #[serde(default)]
    setup: Option<serde_json::Value>,
    #[serde(default)]
    workload: Option<serde_json::Value>,
    #[serde(default)]
    teardown: Option<serde_json::Value>,

    #[serde(default)]
    repeat: u32,
}

#[derive(Debug, Default, Deserialize)]
struct ClientFile {
    #[serde(default)]
    workers: Vec<WorkerFile>,
}

#[derive(Debug, Default, Deserialize)]
struct WorkerFile {
    #[serde(default)]
    instances: u64,
    #[serde(default)]
    duration: PlanDuration,
    #[serde(default)]
    delay: PlanDuration,
    #[serde(default)]
    timeout: PlanDuration,
}

/// Numbers are nanoseconds; strings are humantime (`250ms`, `1m30s`).
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct PlanDuration(Duration);

impl<'de> Deserialize<'de> for PlanDuration {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        struct V;

        impl<'de> serde::de::Visitor<'de> for V {
            type Value = PlanDuration;

            fn expecting(&self, f: &mut std::fmt::Formatter) -> std::fmt::Result {
                f.write_str("duration as string (e.g. 10s) or integer nanoseconds")
            }

            fn visit_u64<E>(self, v: u64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(PlanDuration(Duration::from_nanos(v)))
            }

            fn visit_i64<E>(self, v: i64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if v < 0 {
                    return Err(E::custom("duration must not be negative"));
                }
                Ok(PlanDuration(Duration::from_nanos(v as u64)))
            }

            fn visit_f64<E>(self, v: f64) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                if !v.is_finite() || v < 0.0 {
                    return Err(E::custom("duration must be a finite, non-negative number"));
                }
                let d = Duration::try_from_secs_f64(v / 1e9).map_err(E::custom)?;
                Ok(PlanDuration(d))
            }

            fn visit_str<E>(self, v: &str) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                let v = v.trim();
                if let Ok(nanos) = v.parse::<u64>() {
                    return Ok(PlanDuration(Duration::from_nanos(nanos)));
                }
                let d = humantime::parse_duration(v).map_err(E::custom)?;
                Ok(PlanDuration(d))
            }

            fn visit_string<E>(self, v: String) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                self.visit_str(&v)
            }

            fn visit_unit<E>(self) -> Result<Self::Value, E>
            where
                E: serde::de::Error,
            {
                Ok(PlanDuration::default())
            }
        }

        deserializer.deserialize_any(V)
    }
}

impl PlanFile {
    fn into_plan(self) -> Plan {
        Plan {
            pattern: Pattern::from_plan_value(self.pattern.as_deref()),
            phases: self.phases.into_iter().map(PhaseFile::into_phase).collect(),
        }
    }
}

impl PhaseFile {
    fn into_phase(self) -> Phase {
        // `setup:` with no value is YAML null; treat it like an absent key.
        let present = |v: Option<serde_json::Value>| v.filter(|v| !v.is_null());

        Phase {
            name: self.name,
            workers: self
                .client
                .workers
                .into_iter()
                .map(|w| WorkerGroup {
                    instances: w.instances,
                    duration: w.duration.0,
                    delay: w.delay.0,
                    timeout: w.timeout.0,
                })
                .collect(),
            setup: present(self.setup),
            workload: present(self.workload),
            teardown: present(self.teardown),
            repeat: self.repeat,
        }
    }
}

fn is_json(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .is_some_and(|e| e.eq_ignore_ascii_case("json"))
}

/// Parses a plan document; `json` selects the JSON parser, YAML otherwise.
pub(crate) fn parse_plan(contents: &str, json: bool) -> anyhow::Result<Plan> {
    let file: PlanFile = if json {
        serde_json::from_str(contents).context("invalid JSON plan")?
    } else {
        serde_yaml::from_str(contents).context("invalid YAML plan")?
    };
    Ok(file.into_plan())
}

pub(crate) async fn load_plan(path: &Path) -> anyhow::Result<Plan> {
    let contents = tokio::fs::read_to_string(path)
        .await
        .with_context(|| format!("failed to read plan: {}", path.display()))?;

    parse_plan(&contents, is_json(path))
        .with_context(|| format!("failed to load plan: {}", path.display()))
}

#[cfg(test)]
mod tests {
    #![allow(clippy::unwrap_used)]

    use super::*;
    use serde_json::json;

    fn parse(contents: &str, json: bool) -> Plan {
        parse_plan(contents, json).unwrap()
    }

    #[test]
    fn yaml_plan_with_mixed_duration_forms() {
        let plan = parse(
            r#"
pattern: cycle
phases:
  - name: warmup
    repeat: 3
    client:
      workers:
        - instances: 5
          duration: 2m
          delay: 100ms
          timeout: 5000000000
    setup:
      name: create-table
    workload:
      actions:
        - name: query
          config: { rows: 10 }
    teardown:
  - name: idle
"#,
            false,
        );

        assert_eq!(plan.pattern, Pattern::Cycle);
        assert_eq!(plan.phases.len(), 2);

        let warmup = &plan.phases[0];
        assert_eq!(warmup.name, "warmup");
        assert_eq!(warmup.repeat, 3);
        assert_eq!(
            warmup.workers,
            vec![WorkerGroup {
                instances: 5,
                duration: Duration::from_secs(120),
                delay: Duration::from_millis(100),
                timeout: Duration::from_secs(5),
            }]
        );
        assert_eq!(warmup.setup, Some(json!({"name": "create-table"})));
        assert_eq!(
            warmup.workload,
            Some(json!({"actions": [{"name": "query", "config": {"rows": 10}}]}))
        );
        assert_eq!(warmup.teardown, None);

        let idle = &plan.phases[1];
        assert!(idle.workers.is_empty());
        assert_eq!(idle.repeat, 0);
    }

    #[test]
    fn json_plan() {
        let plan = parse(
            r#"{
                "phases": [
                    {
                        "name": "steady",
                        "client": { "workers": [ { "instances": 2, "duration": "90s" } ] },
                        "workload": { "name": "ping" }
                    }
                ]
            }"#,
            true,
        );

        assert_eq!(plan.pattern, Pattern::Sequence);
        assert_eq!(plan.phases[0].workers[0].duration, Duration::from_secs(90));
        assert_eq!(plan.phases[0].workers[0].delay, Duration::ZERO);
    }

    #[test]
    fn float_nanoseconds_are_accepted() {
        let plan = parse(
            "phases:\n  - client:\n      workers:\n        - duration: 1.5e9\n          delay: 2.5e8\n",
            false,
        );
        assert_eq!(plan.phases[0].workers[0].duration, Duration::from_millis(1500));
        assert_eq!(plan.phases[0].workers[0].delay, Duration::from_millis(250));

        let plan = parse(
            r#"{"phases": [{"client": {"workers": [{"duration": 6e10}]}}]}"#,
            true,
        );
        assert_eq!(plan.phases[0].workers[0].duration, Duration::from_secs(60));

        let err = parse_plan(
            "phases:\n  - client:\n      workers:\n        - timeout: -1.5\n",
            false,
        );
        assert!(err.is_err());
    }

    #[test]
    fn unknown_plan_pattern_falls_back_to_sequence() {
        let plan = parse("pattern: zigzag\nphases: [{name: a}]\n", false);
        assert_eq!(plan.pattern, Pattern::Sequence);
    }

    #[test]
    fn malformed_durations_are_rejected() {
        let err = parse_plan(
            "phases:\n  - client:\n      workers:\n        - duration: soon\n",
            false,
        );
        assert!(err.is_err());

        let err = parse_plan(
            "phases:\n  - client:\n      workers:\n        - delay: -5\n",
            false,
        );
        assert!(err.is_err());
    }

    #[test]
    fn unknown_top_level_keys_are_rejected() {
        assert!(parse_plan("phase: []\n", false).is_err());
    }
}
