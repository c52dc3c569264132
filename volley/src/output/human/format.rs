use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::time::Duration;

use volley_core::runner::PhaseSummary;

pub(crate) fn format_duration_single(d: Duration) -> String {
    // One rounded component in us, ms or s keeps summary lines short.
    let total_ns = d.as_nanos();

    const NS_PER_US: u128 = 1_000;
    const NS_PER_MS: u128 = 1_000_000;
    const NS_PER_S: u128 = 1_000_000_000;

    fn round_div(value: u128, unit: u128) -> u128 {
        (value + (unit / 2)) / unit
    }

    if total_ns >= NS_PER_S {
        return format!("{}s", round_div(total_ns, NS_PER_S));
    }
    if total_ns >= NS_PER_MS {
        return format!("{}ms", round_div(total_ns, NS_PER_MS));
    }

    format!("{}us", round_div(total_ns, NS_PER_US))
}

/// Whole seconds via humantime (`1h 30m 5s`); sub-second durations use [`format_duration_single`].
pub(crate) fn format_span(d: Duration) -> String {
    if d < Duration::from_secs(1) {
        return format_duration_single(d);
    }
    humantime::format_duration(Duration::from_secs(d.as_secs())).to_string()
}

fn format_status_codes(codes: &BTreeMap<u16, u64>) -> String {
    if codes.is_empty() {
        return "-".to_string();
    }
    codes
        .iter()
        .map(|(code, count)| format!("{code}={count}"))
        .collect::<Vec<_>>()
        .join(" ")
}

pub(crate) fn render_phase_summary(s: &PhaseSummary) -> String {
    let mut out = String::new();

    writeln!(
        &mut out,
        "phase {} `{}` (execution {}): {}",
        s.phase + 1,
        s.name,
        s.execution,
        s.end
    )
    .ok();
    writeln!(&mut out, "  took: {}", format_span(s.elapsed)).ok();
    writeln!(
        &mut out,
        "  requests: {} (errors {})",
        s.requests, s.errors
    )
    .ok();
    writeln!(
        &mut out,
        "  avg latency: {}",
        format_duration_single(s.mean_latency)
    )
    .ok();
    writeln!(
        &mut out,
        "  status codes: {}",
        format_status_codes(&s.status_codes)
    )
    .ok();

    out
}
