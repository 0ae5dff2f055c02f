use comfy_table::{Attribute, Cell, CellAlignment, Color, Table, modifiers, presets};
use itertools::{Itertools, MinMaxResult};

use crate::{
    api::edistribucion::{
        BreakerState,
        ConsumptionCurve,
        Contract,
        MaximeterHistogram,
        MeterSnapshot,
    },
    quantity::{percent::Percent, power::Kilowatts},
    sensor::SensorState,
};

fn new_table() -> Table {
    let mut table = Table::new();
    table
        .load_preset(presets::UTF8_FULL_CONDENSED)
        .apply_modifier(modifiers::UTF8_ROUND_CORNERS)
        .enforce_styling();
    table
}

fn optional_cell<T: ToString>(value: Option<T>) -> Cell {
    value.map_or_else(|| Cell::new("–").add_attribute(Attribute::Dim), Cell::new)
}

fn breaker_cell(breaker: Option<&BreakerState>) -> Cell {
    match breaker {
        Some(state @ BreakerState::Closed) => Cell::new(state).fg(Color::Green),
        Some(state @ BreakerState::Open) => Cell::new(state).fg(Color::Red),
        Some(state) => Cell::new(state).fg(Color::DarkYellow),
        None => optional_cell(None::<&str>),
    }
}

fn load_cell(load: Option<Percent>) -> Cell {
    let color = if load.is_some_and(|load| load >= Percent::HIGH_LOAD) {
        Color::Red
    } else {
        Color::Green
    };
    optional_cell(load).set_alignment(CellAlignment::Right).fg(color)
}

pub fn build_sensor_table(state: &SensorState) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Attribute", "Value"]);
    table.add_row(vec![
        Cell::new("Power").add_attribute(Attribute::Bold),
        optional_cell(state.power).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![Cell::new("Supply point"), Cell::new(&state.supply_point)]);
    table.add_row(vec![Cell::new("Breaker"), breaker_cell(state.breaker.as_ref())]);
    table.add_row(vec![
        Cell::new("Totalizer"),
        Cell::new(state.totalizer).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![Cell::new("Load"), load_cell(state.load)]);
    table.add_row(vec![
        Cell::new("Contracted power"),
        optional_cell(state.contracted_power).set_alignment(CellAlignment::Right),
    ]);
    table.add_row(vec![
        Cell::new("Today"),
        Cell::new(state.today).set_alignment(CellAlignment::Right),
    ]);
    if let Some(history) = &state.history {
        for (name, value) in [
            ("Yesterday", history.yesterday),
            ("Last 7 days", history.last_7_days),
            ("Last 30 days", history.last_30_days),
        ] {
            table.add_row(vec![
                Cell::new(name).add_attribute(Attribute::Dim),
                Cell::new(value).set_alignment(CellAlignment::Right),
            ]);
        }
        table.add_row(vec![
            Cell::new("Maximeter peak").add_attribute(Attribute::Dim),
            Cell::new(history.max_power).set_alignment(CellAlignment::Right).fg(
                if state.contracted_power.is_some_and(|contracted| history.max_power > contracted) {
                    Color::Red
                } else {
                    Color::Reset
                },
            ),
        ]);
    }
    table
}

pub fn build_contracts_table(contracts: &[Contract]) -> Table {
    let mut table = new_table();
    table.set_header(vec!["#", "ID", "Supply point", "CUPS"]);
    for (index, contract) in contracts.iter().enumerate() {
        table.add_row(vec![
            Cell::new(index + 1).add_attribute(Attribute::Dim),
            Cell::new(&contract.id).add_attribute(if index == 0 {
                Attribute::Bold
            } else {
                Attribute::NormalIntensity
            }),
            Cell::new(contract.supply_point()),
            optional_cell(contract.label.as_deref()),
        ]);
    }
    table
}

pub fn build_meter_table(meter: &MeterSnapshot) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Totalizer", "Power", "Contracted", "Load", "Breaker"]);
    table.add_row(vec![
        Cell::new(meter.totalizer).set_alignment(CellAlignment::Right),
        optional_cell(meter.current_power).set_alignment(CellAlignment::Right),
        optional_cell(meter.contracted_power).set_alignment(CellAlignment::Right),
        load_cell(meter.load),
        breaker_cell(meter.breaker.as_ref()),
    ]);
    table
}

pub fn build_curve_table(curve: &ConsumptionCurve) -> Table {
    let (min, max) = match curve.buckets.iter().filter_map(|bucket| bucket.value).minmax() {
        MinMaxResult::NoElements => (None, None),
        MinMaxResult::OneElement(value) => (Some(value), Some(value)),
        MinMaxResult::MinMax(min, max) => (Some(min), Some(max)),
    };

    let mut table = new_table();
    table.set_header(vec!["Bucket", "Energy"]);
    for bucket in &curve.buckets {
        let color = match bucket.value {
            value @ Some(_) if value == max => Color::Red,
            value @ Some(_) if value == min => Color::Green,
            _ => Color::Reset,
        };
        table.add_row(vec![
            Cell::new(bucket.label()).add_attribute(Attribute::Dim),
            optional_cell(bucket.value).set_alignment(CellAlignment::Right).fg(color),
        ]);
    }
    table.add_row(vec![
        Cell::new("Total").add_attribute(Attribute::Bold),
        Cell::new(curve.total).set_alignment(CellAlignment::Right).add_attribute(Attribute::Bold),
    ]);
    table
}

pub fn build_maximeter_table(
    histogram: &MaximeterHistogram,
    contracted_power: Option<Kilowatts>,
) -> Table {
    let mut table = new_table();
    table.set_header(vec!["Month", "Peak power"]);
    for reading in &histogram.readings {
        let color = match (reading.value, contracted_power) {
            (Some(value), Some(contracted)) if value > contracted => Color::Red,
            (Some(value), _) if value == histogram.peak => Color::DarkYellow,
            _ => Color::Reset,
        };
        table.add_row(vec![
            optional_cell(reading.date.as_deref()).add_attribute(Attribute::Dim),
            optional_cell(reading.value).set_alignment(CellAlignment::Right).fg(color),
        ]);
    }
    table.add_row(vec![
        Cell::new(format!("{} – {}", histogram.from, histogram.to))
            .add_attribute(Attribute::Bold),
        Cell::new(histogram.peak)
            .set_alignment(CellAlignment::Right)
            .add_attribute(Attribute::Bold),
    ]);
    table
}
