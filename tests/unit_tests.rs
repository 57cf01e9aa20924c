//! Unit tests for the statistics engine, formatter and parallel setup
//!
//! Each statistic is exercised on small hand-computed member sets, including
//! absent members and empty tables.

use approx::assert_relative_eq;
use chrono::{NaiveDate, NaiveDateTime};
use meteo_ensemble::{
    errors::EnsembleError,
    formatting::{ColumnData, Formatter, RenderTable, Rounding, RoundingRule},
    parallel::{get_parallel_info, ParallelConfig},
    statistics::{
        cloud_cover_probabilities, octa_probabilities, percent_to_octa, percentiles,
        precipitation_stats, quantile_linear, weather_code_probabilities,
        wind_direction_probabilities, Hazard, MemberStatistics, SectorBoundary,
        StatisticsOptions, VariableKind, COMPASS_LABELS,
    },
    table::{TimeIndex, VariableTable},
};

fn hour(h: u32) -> NaiveDateTime {
    NaiveDate::from_ymd_opt(2024, 5, 1)
        .unwrap()
        .and_hms_opt(h, 0, 0)
        .unwrap()
}

/// One row per entry of `rows`, one member per value
fn table(variable: &str, rows: &[&[Option<f64>]]) -> VariableTable {
    let n_members = rows.first().map_or(0, |r| r.len());
    let members = (1..=n_members).map(|m| format!("member{m:02}")).collect();
    let columns = (0..n_members)
        .map(|m| rows.iter().map(|r| r[m]).collect())
        .collect();
    let index = TimeIndex::Naive((0..rows.len() as u32).map(hour).collect());
    VariableTable::new(variable, index, members, columns).unwrap()
}

fn single_row(variable: &str, values: &[f64]) -> VariableTable {
    let row: Vec<Option<f64>> = values.iter().copied().map(Some).collect();
    table(variable, &[&row])
}

#[test]
fn test_quantile_linear() {
    let sorted = [10.0, 11.0, 12.0, 13.0, 14.0];
    assert_relative_eq!(quantile_linear(&sorted, 0.1), 10.4, epsilon = 1e-12);
    assert_relative_eq!(quantile_linear(&sorted, 0.5), 12.0, epsilon = 1e-12);
    assert_relative_eq!(quantile_linear(&sorted, 0.9), 13.6, epsilon = 1e-12);
    assert_eq!(quantile_linear(&[7.5], 0.9), 7.5);
    assert!(quantile_linear(&[], 0.5).is_nan());
}

#[test]
fn test_percentiles_scenario() {
    let stats = percentiles(&single_row("temperature_2m", &[13.0, 10.0, 14.0, 11.0, 12.0])).unwrap();
    assert_eq!(stats.statistics(), ["p10", "median", "p90"]);
    assert_relative_eq!(stats.get(0, "p10").unwrap(), 10.4, epsilon = 1e-9);
    assert_relative_eq!(stats.get(0, "median").unwrap(), 12.0, epsilon = 1e-9);
    assert_relative_eq!(stats.get(0, "p90").unwrap(), 13.6, epsilon = 1e-9);
}

#[test]
fn test_percentiles_single_member() {
    let stats = percentiles(&single_row("pressure_msl", &[1013.2])).unwrap();
    for statistic in ["p10", "median", "p90"] {
        assert_eq!(stats.get(0, statistic), Some(1013.2));
    }
}

#[test]
fn test_percentiles_skip_absent_members() {
    let stats = percentiles(&table(
        "temperature_2m",
        &[
            &[Some(1.0), None, Some(3.0)],
            &[None, None, None],
        ],
    ))
    .unwrap();
    assert_relative_eq!(stats.get(0, "median").unwrap(), 2.0, epsilon = 1e-12);
    // No member reported: every statistic absent, row kept
    assert_eq!(stats.n_rows(), 2);
    assert_eq!(stats.get(1, "median"), None);
}

#[test]
fn test_empty_input_keeps_columns() {
    let empty = VariableTable::new(
        "temperature_2m",
        TimeIndex::Naive(Vec::new()),
        Vec::new(),
        Vec::new(),
    )
    .unwrap();

    let p = percentiles(&empty).unwrap();
    assert!(p.is_empty());
    assert_eq!(p.statistics(), ["p10", "median", "p90"]);

    let octas = octa_probabilities(&empty).unwrap();
    assert_eq!(octas.statistics().len(), 9);

    let wind = wind_direction_probabilities(&empty, SectorBoundary::Floor).unwrap();
    assert_eq!(wind.statistics().len(), 8);
}

#[test]
fn test_percentile_ordering() {
    let rows: Vec<Vec<Option<f64>>> = (0..24)
        .map(|r| {
            (0..7)
                .map(|m| Some(((r * 31 + m * 17) % 23) as f64 - 5.0))
                .collect()
        })
        .collect();
    let refs: Vec<&[Option<f64>]> = rows.iter().map(Vec::as_slice).collect();
    let stats = percentiles(&table("dew_point_2m", &refs)).unwrap();
    for row in 0..stats.n_rows() {
        let p10 = stats.get(row, "p10").unwrap();
        let median = stats.get(row, "median").unwrap();
        let p90 = stats.get(row, "p90").unwrap();
        assert!(p10 <= median && median <= p90, "row {row}: {p10} {median} {p90}");
    }
}

#[test]
fn test_precipitation_stats() {
    let stats = precipitation_stats(&single_row("precipitation", &[0.0, 2.0, 0.0, 4.0])).unwrap();
    assert_eq!(stats.get(0, "probability"), Some(0.5));
    assert_eq!(stats.get(0, "conditional_average"), Some(3.0));
}

#[test]
fn test_precipitation_dry_row() {
    let stats = precipitation_stats(&single_row("precipitation", &[0.0, -1.0, 0.0])).unwrap();
    assert_eq!(stats.get(0, "probability"), Some(0.0));
    assert_eq!(stats.get(0, "conditional_average"), Some(0.0));
}

#[test]
fn test_octa_all_clear() {
    let stats = octa_probabilities(&single_row("cloud_cover", &[0.0; 5])).unwrap();
    assert_eq!(stats.get(0, "octa_0_prob"), Some(1.0));
    for k in 1..=8 {
        assert_eq!(stats.get(0, &format!("octa_{k}_prob")), Some(0.0));
    }
}

#[test]
fn test_octa_spread() {
    let stats = octa_probabilities(&single_row("cloud_cover", &[8.0, 7.0, 6.0, 5.0, 4.0])).unwrap();
    for k in 0..4 {
        assert_eq!(stats.get(0, &format!("octa_{k}_prob")), Some(0.0));
    }
    for k in 4..=8 {
        assert_relative_eq!(stats.get(0, &format!("octa_{k}_prob")).unwrap(), 0.2);
    }
}

#[test]
fn test_octa_rejects_non_octa_values() {
    let err = octa_probabilities(&single_row("cloud_cover", &[2.5])).unwrap_err();
    assert!(matches!(err, EnsembleError::InvalidValue { .. }));
    let err = octa_probabilities(&single_row("cloud_cover", &[9.0])).unwrap_err();
    assert!(matches!(err, EnsembleError::InvalidValue { .. }));
}

#[test]
fn test_percent_to_octa() {
    assert_eq!(percent_to_octa(0.0).unwrap(), 0.0);
    assert_eq!(percent_to_octa(100.0).unwrap(), 8.0);
    assert_eq!(percent_to_octa(50.0).unwrap(), 4.0);
    // 6.25 % is exactly half an octa: ties go to the even octa
    assert_eq!(percent_to_octa(6.25).unwrap(), 0.0);
    assert_eq!(percent_to_octa(18.75).unwrap(), 2.0);
    assert!(percent_to_octa(100.5).is_err());
    assert!(percent_to_octa(-1.0).is_err());
}

#[test]
fn test_cloud_cover_percent_distribution() {
    let stats = cloud_cover_probabilities(&single_row("cloud_cover", &[0.0, 100.0, 100.0, 50.0])).unwrap();
    assert_eq!(stats.get(0, "octa_0_prob"), Some(0.25));
    assert_eq!(stats.get(0, "octa_4_prob"), Some(0.25));
    assert_eq!(stats.get(0, "octa_8_prob"), Some(0.5));
}

#[test]
fn test_octa_probabilities_sum_to_one() {
    let stats = cloud_cover_probabilities(&table(
        "cloud_cover",
        &[
            &[Some(3.0), Some(47.0), None, Some(88.0), Some(100.0)],
            &[Some(12.0), Some(12.0), Some(64.0), Some(0.0), None],
        ],
    ))
    .unwrap();
    for row in 0..stats.n_rows() {
        let total: f64 = stats.values().row(row).sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_wind_sectors_floor() {
    let b = SectorBoundary::Floor;
    assert_eq!(b.sector(0.0), 0);
    assert_eq!(b.sector(22.4), 0);
    assert_eq!(b.sector(22.5), 1);
    assert_eq!(b.sector(44.0), 1);
    assert_eq!(b.sector(180.0), 4);
    assert_eq!(b.sector(337.5), 0);
    assert_eq!(b.sector(359.9), 0);
    assert_eq!(b.sector(360.0), 0);
}

#[test]
fn test_wind_sectors_half_even() {
    let b = SectorBoundary::HalfEven;
    assert_eq!(b.sector(22.5), 0);
    assert_eq!(b.sector(67.5), 2);
    assert_eq!(b.sector(337.5), 0);
    assert_eq!(b.sector(44.0), 1);
}

#[test]
fn test_wind_direction_scenario() {
    let directions = single_row("wind_direction_10m", &[0.0, 44.0, 22.4, 22.5, 337.5]);

    let floor = wind_direction_probabilities(&directions, SectorBoundary::Floor).unwrap();
    assert_relative_eq!(floor.get(0, "N_prob").unwrap(), 0.6);
    assert_relative_eq!(floor.get(0, "NE_prob").unwrap(), 0.4);

    let half_even = wind_direction_probabilities(&directions, SectorBoundary::HalfEven).unwrap();
    assert_relative_eq!(half_even.get(0, "N_prob").unwrap(), 0.8);
    assert_relative_eq!(half_even.get(0, "NE_prob").unwrap(), 0.2);

    for stats in [&floor, &half_even] {
        let total: f64 = COMPASS_LABELS
            .iter()
            .map(|l| stats.get(0, &format!("{l}_prob")).unwrap())
            .sum();
        assert_relative_eq!(total, 1.0, epsilon = 1e-9);
    }
}

#[test]
fn test_hazard_classification() {
    assert_eq!(Hazard::classify(45.0), Some(Hazard::Fog));
    assert_eq!(Hazard::classify(28.0), Some(Hazard::Fog));
    assert_eq!(Hazard::classify(95.0), Some(Hazard::Storm));
    assert_eq!(Hazard::classify(99.0), Some(Hazard::SevereStorm));
    assert_eq!(Hazard::classify(0.0), None);
    assert_eq!(Hazard::classify(61.0), None);
    assert_eq!(Hazard::classify(45.5), None);
    assert_eq!(Hazard::classify(-1.0), None);
}

#[test]
fn test_hazard_code_sets() {
    let cases = [
        (10, Some(Hazard::Fog)),
        (11, Some(Hazard::Fog)),
        (12, Some(Hazard::Fog)),
        (28, Some(Hazard::Fog)),
        (40, Some(Hazard::Fog)),
        (49, Some(Hazard::Fog)),
        (13, Some(Hazard::Storm)),
        (17, Some(Hazard::Storm)),
        (29, Some(Hazard::Storm)),
        (95, Some(Hazard::Storm)),
        (96, Some(Hazard::Storm)),
        (98, Some(Hazard::Storm)),
        (18, Some(Hazard::SevereStorm)),
        (19, Some(Hazard::SevereStorm)),
        (97, Some(Hazard::SevereStorm)),
        (99, Some(Hazard::SevereStorm)),
        (9, None),
        (14, None),
        (27, None),
        (39, None),
        (50, None),
        (94, None),
        (100, None),
    ];
    for (code, expected) in cases {
        assert_eq!(Hazard::of(code), expected, "code {code}");
        assert_eq!(Hazard::classify(f64::from(code)), expected, "code {code}");
        for hazard in Hazard::ALL {
            assert_eq!(hazard.includes(code), expected == Some(hazard), "code {code}");
        }
    }
}

#[test]
fn test_weather_code_probabilities() {
    let stats = weather_code_probabilities(&single_row("weather_code", &[45.0, 95.0, 99.0, 3.0])).unwrap();
    assert_eq!(stats.statistics(), ["fog_prob", "storm_prob", "severe_storm_prob"]);
    assert_eq!(stats.get(0, "fog_prob"), Some(0.25));
    assert_eq!(stats.get(0, "storm_prob"), Some(0.25));
    assert_eq!(stats.get(0, "severe_storm_prob"), Some(0.25));

    let calm = weather_code_probabilities(&single_row("weather_code", &[0.0, 1.0, 61.0])).unwrap();
    for hazard in Hazard::ALL {
        assert_eq!(calm.get(0, hazard.statistic()), Some(0.0));
    }
}

#[test]
fn test_weather_code_rejects_non_codes() {
    for code in [45.5, -1.0, 96.01] {
        let err = weather_code_probabilities(&single_row("weather_code", &[95.0, code])).unwrap_err();
        assert!(
            matches!(err, EnsembleError::InvalidValue { statistic: "weather code", .. }),
            "{code}"
        );
    }
}

#[test]
fn test_kind_dispatch() {
    let options = StatisticsOptions::default();
    let stats = single_row("precipitation", &[0.0, 1.0])
        .member_statistics(VariableKind::PrecipitationLike, &options)
        .unwrap();
    assert_eq!(stats.statistics(), ["probability", "conditional_average"]);

    let stats = single_row("wind_direction_10m", &[90.0])
        .member_statistics(VariableKind::WindDirection, &options)
        .unwrap();
    assert_eq!(stats.get(0, "E_prob"), Some(1.0));
    assert_eq!(VariableKind::WindDirection.as_str(), "wind_direction");
}

#[test]
fn test_variable_table_validation() {
    let index = TimeIndex::Naive(vec![hour(1), hour(0)]);
    let err = VariableTable::new("t", index, vec!["m".into()], vec![vec![Some(1.0), Some(2.0)]])
        .unwrap_err();
    assert!(matches!(err, EnsembleError::UnsortedIndex { row: 1, .. }));

    let index = TimeIndex::Naive(vec![hour(0), hour(1)]);
    let err = VariableTable::new("t", index, vec!["m".into()], vec![vec![Some(1.0)]]).unwrap_err();
    assert!(matches!(err, EnsembleError::ShapeMismatch { .. }));
}

fn render(columns: Vec<(&str, Vec<Option<f64>>)>) -> RenderTable {
    let n = columns.first().map_or(0, |(_, v)| v.len());
    let index = (0..n as u32).map(|h| hour(h).and_utc().fixed_offset()).collect();
    let mut table = RenderTable::new(index);
    for (name, values) in columns {
        table.push_column(name, ColumnData::Float(values)).unwrap();
    }
    table
}

fn floats<'a>(table: &'a RenderTable, name: &str) -> &'a [Option<f64>] {
    match table.column(name) {
        Some(ColumnData::Float(values)) => values,
        other => panic!("expected float column '{name}', got {other:?}"),
    }
}

#[test]
fn test_formatter_default_rules() {
    let table = render(vec![
        ("cloud_cover_octa_3_prob", vec![Some(0.333_333)]),
        ("temperature_2m_p10", vec![Some(12.345)]),
        ("precipitation_probability", vec![Some(0.21)]),
        ("weather_code_storm_prob", vec![Some(0.666_6)]),
        ("pressure_msl_median", vec![None]),
    ]);
    let formatted = Formatter::default().format(&table);

    assert_eq!(floats(&formatted, "cloud_cover_octa_3_prob"), [Some(0.33)]);
    assert_eq!(floats(&formatted, "temperature_2m_p10"), [Some(12.3)]);
    // Matched by the generic probability rule before the precipitation rule
    assert_eq!(floats(&formatted, "precipitation_probability"), [Some(0.21)]);
    assert_eq!(floats(&formatted, "weather_code_storm_prob"), [Some(0.67)]);
    assert_eq!(floats(&formatted, "pressure_msl_median"), [None]);

    // Input untouched
    assert_eq!(floats(&table, "temperature_2m_p10"), [Some(12.345)]);
}

#[test]
fn test_formatter_cloud_cover_integer() {
    let table = render(vec![("cloud_cover_median", vec![Some(62.5), Some(63.5), None])]);
    let formatted = Formatter::default().format(&table);
    assert_eq!(
        formatted.column("cloud_cover_median"),
        Some(&ColumnData::Integer(vec![Some(62), Some(64), None]))
    );
}

#[test]
fn test_formatter_precipitation_ceiling_with_custom_order() {
    let formatter = Formatter::new(
        vec![
            RoundingRule::CloudCover,
            RoundingRule::PrecipitationProbability,
            RoundingRule::Probability,
        ],
        Rounding::Decimals(1),
    );
    let table = render(vec![(
        "precipitation_probability",
        vec![Some(0.21), Some(0.25), Some(0.0), Some(0.96)],
    )]);
    let formatted = formatter.format(&table);
    let values: Vec<f64> = floats(&formatted, "precipitation_probability")
        .iter()
        .map(|v| v.unwrap())
        .collect();
    assert_relative_eq!(values[0], 0.25, epsilon = 1e-12);
    assert_relative_eq!(values[1], 0.25, epsilon = 1e-12);
    assert_relative_eq!(values[2], 0.0, epsilon = 1e-12);
    assert_relative_eq!(values[3], 1.0, epsilon = 1e-12);
}

#[test]
fn test_formatter_idempotent() {
    let table = render(vec![
        ("cloud_cover_p90", vec![Some(87.5), Some(12.49)]),
        ("cloud_cover_octa_1_prob", vec![Some(0.125), Some(0.875)]),
        ("temperature_2m_median", vec![Some(-0.05), Some(21.25)]),
        ("precipitation_probability", vec![Some(0.333), Some(0.05)]),
        ("precipitation_conditional_average", vec![Some(1.25), Some(0.35)]),
    ]);
    for formatter in [
        Formatter::default(),
        Formatter::uniform(1),
        Formatter::new(
            vec![RoundingRule::PrecipitationProbability],
            Rounding::Decimals(2),
        ),
    ] {
        let once = formatter.format(&table);
        let twice = formatter.format(&once);
        assert_eq!(once, twice);
    }
}

#[test]
fn test_formatter_text_passthrough() {
    let mut table = render(vec![("temperature_2m_p90", vec![Some(1.26)])]);
    table
        .push_column("model", ColumnData::Text(vec![Some("icon_seamless".to_string())]))
        .unwrap();
    let formatted = Formatter::default().format(&table);
    assert_eq!(formatted.column("model"), table.column("model"));
    assert_eq!(floats(&formatted, "temperature_2m_p90"), [Some(1.3)]);
}

#[test]
fn test_render_column_length_checked() {
    let mut table = render(vec![("temperature_2m_p10", vec![Some(1.0), Some(2.0)])]);
    let err = table
        .push_column("dew_point_2m_p10", ColumnData::Float(vec![Some(1.0)]))
        .unwrap_err();
    assert!(matches!(err, EnsembleError::ShapeMismatch { expected: 2, found: 1, .. }));
}

#[test]
fn test_parallel_config() {
    let default_config = ParallelConfig::default();
    assert!(default_config.num_threads.is_none());

    let config_4 = ParallelConfig::with_threads(4);
    assert_eq!(config_4.num_threads, Some(4));

    let all_cores_config = ParallelConfig::all_cores();
    assert!(all_cores_config.num_threads.unwrap() > 0);

    assert!(default_config.current_threads() > 0);
    assert!(ParallelConfig::with_threads(0).setup_global_pool().is_err());
}

#[test]
fn test_parallel_info() {
    let info = get_parallel_info();
    assert!(info.current_threads > 0);
    assert!(info.available_cores > 0);
    assert!(info.available_parallelism > 0);
    info.log();
}
