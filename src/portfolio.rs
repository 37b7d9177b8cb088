use crate::error::TrackerError;
use crate::format::{format_currency, format_percent, format_quantity, format_with_commas};
use crate::prices::{asset_ids, PriceMap, PriceSource};
use crate::stake::StakeRecord;
use crate::store::RecordStore;
use crate::valuation::{allocation, valuate, Valuation};
use chrono::{DateTime, Local};
use colored::Colorize;
use piechart::{Chart, Color};
use std::collections::BTreeSet;

/// How much of the referenced assets the last refresh managed to price.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PriceStatus {
    Live,
    Partial,
    Unavailable,
}

impl PriceStatus {
    fn from_coverage(asset_ids: &BTreeSet<String>, prices: &PriceMap) -> Self {
        let priced = asset_ids
            .iter()
            .filter(|id| prices.contains_key(*id))
            .count();
        if priced == asset_ids.len() {
            PriceStatus::Live
        } else if priced == 0 {
            PriceStatus::Unavailable
        } else {
            PriceStatus::Partial
        }
    }
}

/// A change to the stored stake list.
#[derive(Debug, Clone)]
pub enum Mutation {
    Add(StakeRecord),
    Import(Vec<StakeRecord>),
    /// Zero-based position in the list as last rendered.
    Remove(usize),
    Clear,
}

/// Application state: the stake list, the prices of the last refresh and
/// everything derived from them.
pub struct Portfolio {
    store: RecordStore,
    source: Box<dyn PriceSource>,
    currency: String,
    pub records: Vec<StakeRecord>,
    pub prices: PriceMap,
    pub valuation: Valuation,
    pub refreshed_at: Option<DateTime<Local>>,
    pub price_status: PriceStatus,
}

impl Portfolio {
    pub fn new(store: RecordStore, source: Box<dyn PriceSource>, currency: &str) -> Portfolio {
        Portfolio {
            store,
            source,
            currency: currency.trim().to_lowercase(),
            records: Vec::new(),
            prices: PriceMap::new(),
            valuation: Valuation::default(),
            refreshed_at: None,
            price_status: PriceStatus::Live,
        }
    }

    pub fn currency(&self) -> &str {
        &self.currency
    }

    pub fn source_name(&self) -> &'static str {
        self.source.name()
    }

    /// Reads the stored stakes without touching prices.
    pub fn load_records(&mut self) {
        self.records = self.store.load();
    }

    /// Reloads the stakes, re-fetches every referenced price and recomputes
    /// all figures. The previous price map is replaced, not merged.
    pub async fn refresh(&mut self) {
        self.load_records();
        let ids = asset_ids(&self.records);
        self.prices = self.source.fetch_prices(&ids).await;
        self.price_status = PriceStatus::from_coverage(&ids, &self.prices);
        self.valuation = valuate(&self.records, &self.prices, &self.currency);
        self.refreshed_at = Some(Local::now());
    }

    /// Persists `mutation` and refreshes. Returns the removed stake for
    /// [`Mutation::Remove`]. Nothing changes if the mutation fails.
    pub async fn apply(
        &mut self,
        mutation: Mutation,
    ) -> Result<Option<StakeRecord>, TrackerError> {
        let mut records = self.records.clone();
        let mut removed = None;

        match mutation {
            Mutation::Add(record) => records.push(record),
            Mutation::Import(imported) => records.extend(imported),
            Mutation::Remove(index) => {
                if index >= records.len() {
                    return Err(TrackerError::NoSuchStake(index + 1));
                }
                removed = Some(records.remove(index));
            }
            Mutation::Clear => records.clear(),
        }

        if records.is_empty() {
            self.store.clear()?;
        } else {
            self.store.save(&records)?;
        }
        self.records = records;

        self.refresh().await;
        Ok(removed)
    }

    pub fn refresh_marker(&self) -> String {
        match self.refreshed_at {
            Some(time) => format!(
                "Prices refreshed at {} (source: {})",
                time.format("%H:%M:%S"),
                self.source_name()
            ),
            None => "Prices not loaded yet".to_string(),
        }
    }

    // Print the stakes as a table
    pub fn print(&self) {
        use comfy_table::{
            presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor,
            ContentArrangement, Table,
        };

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(160);

        table.set_header(vec![
            Cell::new("#").add_attribute(Attribute::Bold),
            Cell::new("Platform").add_attribute(Attribute::Bold),
            Cell::new("Staked").add_attribute(Attribute::Bold),
            Cell::new("Price").add_attribute(Attribute::Bold),
            Cell::new("Value").add_attribute(Attribute::Bold),
            Cell::new("Derivative").add_attribute(Attribute::Bold),
            Cell::new("Fee").add_attribute(Attribute::Bold),
            Cell::new("Yield").add_attribute(Attribute::Bold),
            Cell::new("Type").add_attribute(Attribute::Bold),
            Cell::new("Lockup").add_attribute(Attribute::Bold),
            Cell::new("Wallet").add_attribute(Attribute::Bold),
            Cell::new("Notes").add_attribute(Attribute::Bold),
            Cell::new("Est. / year").add_attribute(Attribute::Bold),
        ]);

        if self.records.is_empty() {
            table.add_row(vec![
                Cell::new(""),
                Cell::new("No stakes recorded yet. Add one with `stake_rs add`.")
                    .fg(TColor::DarkGrey),
            ]);
            println!("{table}");
            return;
        }

        for (i, (record, row)) in self
            .records
            .iter()
            .zip(&self.valuation.rows)
            .enumerate()
        {
            // unpriced stakes are shown dimmed so a 0 value is not mistaken for a real one
            let value_color = if self.prices.contains_key(&record.price_key()) {
                TColor::Green
            } else {
                TColor::DarkGrey
            };
            let fee = if record.fee_currency.is_empty()
                || record.fee_currency.eq_ignore_ascii_case(&self.currency)
            {
                format_with_commas(record.fee_paid)
            } else {
                format_currency(record.fee_paid, &record.fee_currency)
            };

            table.add_row(vec![
                Cell::new(i + 1).set_alignment(CellAlignment::Right),
                Cell::new(&record.platform),
                Cell::new(format!(
                    "{} {}",
                    format_quantity(record.staked_quantity),
                    record.staked_token
                ))
                .set_alignment(CellAlignment::Right),
                Cell::new(format_with_commas(row.current_price))
                    .set_alignment(CellAlignment::Right),
                Cell::new(format_with_commas(row.current_value))
                    .set_alignment(CellAlignment::Right)
                    .add_attribute(Attribute::Bold)
                    .fg(value_color),
                Cell::new(record.derivative_token.as_deref().unwrap_or("N/A")),
                Cell::new(fee).set_alignment(CellAlignment::Right),
                Cell::new(format_percent(record.yield_rate)).set_alignment(CellAlignment::Right),
                Cell::new(record.yield_kind),
                Cell::new(record.lockup_display()),
                Cell::new(&record.wallet_label),
                Cell::new(&record.notes),
                Cell::new(format_with_commas(row.estimated_annual_earnings))
                    .set_alignment(CellAlignment::Right),
            ]);
        }

        println!("{table}");
    }

    pub fn print_summary(&self) {
        use comfy_table::{
            presets::UTF8_FULL, Attribute, Cell, CellAlignment, Color as TColor,
            ContentArrangement, Table,
        };

        let summary = &self.valuation.summary;
        let currency = self.currency.to_uppercase();

        let mut table = Table::new();
        table
            .load_preset(UTF8_FULL)
            .set_content_arrangement(ContentArrangement::Dynamic)
            .set_width(100)
            .set_header(vec![
                Cell::new(format!("Total value ({currency})")).add_attribute(Attribute::Bold),
                Cell::new("Fees").add_attribute(Attribute::Bold),
                Cell::new("Net").add_attribute(Attribute::Bold),
                Cell::new("Avg yield").add_attribute(Attribute::Bold),
                Cell::new("Est. earnings / year").add_attribute(Attribute::Bold),
            ]);

        let net_color = if summary.net_value >= 0.0 {
            TColor::Green
        } else {
            TColor::Red
        };
        table.add_row(vec![
            Cell::new(format!("{:.2}", summary.total_value)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", summary.total_fees)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", summary.net_value))
                .set_alignment(CellAlignment::Right)
                .fg(net_color),
            Cell::new(format!("{:.2}", summary.average_yield)).set_alignment(CellAlignment::Right),
            Cell::new(format!("{:.2}", summary.total_estimated_annual_earnings))
                .set_alignment(CellAlignment::Right),
        ]);

        println!("{table}");
        println!("{}", self.refresh_marker().dimmed());

        match self.price_status {
            PriceStatus::Live => {}
            PriceStatus::Partial => println!(
                "{}",
                "Some assets could not be priced and are valued at 0.".yellow()
            ),
            PriceStatus::Unavailable => println!(
                "{}",
                "Prices are unavailable; all stakes are valued at 0.".red()
            ),
        }
        if summary.foreign_fee_count > 0 {
            println!(
                "{}",
                format!(
                    "{} fee(s) in another currency are not included in the fee total.",
                    summary.foreign_fee_count
                )
                .yellow()
            );
        }
    }

    // Print the allocation in descending order %-wise
    pub fn print_allocation(&self) {
        let allocation = allocation(&self.records, &self.valuation);
        if allocation.is_empty() {
            println!("Nothing to allocate: no stake currently has a value.");
            return;
        }

        println!("====================================");
        for (platform, percentage) in allocation {
            println!("{platform: >16} | {percentage: >10.2}");
        }
    }

    pub fn draw_pie_chart(&self) {
        let colors = [
            Color::Red,
            Color::Green,
            Color::Blue,
            Color::Yellow,
            Color::Cyan,
            Color::White,
            Color::Purple,
            Color::Black,
        ];

        let data: Vec<piechart::Data> = allocation(&self.records, &self.valuation)
            .into_iter()
            .enumerate()
            .map(|(i, (platform, percentage))| piechart::Data {
                label: platform,
                value: percentage as f32,
                color: Some(colors[i % colors.len()].into()),
                fill: '•',
            })
            .collect();

        if data.is_empty() {
            return;
        }

        Chart::new()
            .legend(true)
            .radius(9)
            .aspect_ratio(3)
            .draw(&data);
    }
}
