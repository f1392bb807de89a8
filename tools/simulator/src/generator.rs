//! Deterministic event generation
//!
//! Emits a weighted mix of inserts, updates, and deletes across both
//! tables. Updates and deletes target keys the simulator knows are live,
//! so a well-formed stream never deletes a key it has not inserted.
//! All randomness flows from a seeded `ChaCha8Rng` and the send clock is
//! logical, so two simulators with the same configuration produce
//! byte-identical frames.

use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use ingest::codec::encode_frame;
use types::message::{DataMessage, Operation};
use types::schema::TableKind;

/// Configuration for the data simulator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SimulatorConfig {
    /// RNG seed; one seed, one stream.
    pub seed: u64,
    /// Symbols to draw from.
    pub symbols: Vec<String>,
    /// Share of messages that are updates of a live key.
    pub update_ratio: f64,
    /// Share of messages that are deletes of a live key.
    pub delete_ratio: f64,
    /// Share of messages routed to the trade book.
    pub trade_ratio: f64,
    /// Logical send clock start, millisecond epoch.
    pub start_ts_ms: i64,
}

impl Default for SimulatorConfig {
    fn default() -> Self {
        Self {
            seed: 42,
            symbols: ["AAPL", "MSFT", "GOOG", "AMZN", "TSLA", "NVDA", "META", "JPM"]
                .into_iter()
                .map(String::from)
                .collect(),
            update_ratio: 0.30,
            delete_ratio: 0.05,
            trade_ratio: 0.40,
            start_ts_ms: 1_705_312_205_000,
        }
    }
}

/// Stateful generator of wire messages.
pub struct DataSimulator {
    config: SimulatorConfig,
    rng: ChaCha8Rng,
    clock_ms: i64,
    next_order: u64,
    next_trade: u64,
    live_orders: Vec<String>,
    live_trades: Vec<String>,
}

impl DataSimulator {
    pub fn new(config: SimulatorConfig) -> Self {
        let rng = ChaCha8Rng::seed_from_u64(config.seed);
        let clock_ms = config.start_ts_ms;
        Self {
            config,
            rng,
            clock_ms,
            next_order: 0,
            next_trade: 0,
            live_orders: Vec::new(),
            live_trades: Vec::new(),
        }
    }

    /// Produce the next message; the logical clock advances one tick.
    pub fn next_message(&mut self) -> DataMessage {
        self.clock_ms += 1;
        let send_ts = self.clock_ms;

        let table = if self.rng.gen_bool(self.config.trade_ratio) {
            TableKind::TradeBook
        } else {
            TableKind::OrderBook
        };

        let roll: f64 = self.rng.gen();
        let live = self.live_keys(table);

        // Updates and deletes need a live key to aim at
        if live > 0 && roll < self.config.delete_ratio {
            let key = self.take_live_key(table);
            return DataMessage::new(table, Operation::Delete, send_ts, key);
        }
        if live > 0 && roll < self.config.delete_ratio + self.config.update_ratio {
            let key = self.pick_live_key(table);
            let payload = self.payload_for(table, &key);
            return DataMessage::new(table, Operation::Update, send_ts, payload);
        }

        let key = self.mint_key(table);
        let payload = self.payload_for(table, &key);
        DataMessage::new(table, Operation::Insert, send_ts, payload)
    }

    /// Next message rendered as a newline-terminated wire frame.
    pub fn next_frame(&mut self) -> String {
        encode_frame(&self.next_message())
    }

    /// Keys currently live in the simulator's model of a table.
    pub fn live_keys(&self, table: TableKind) -> usize {
        match table {
            TableKind::OrderBook => self.live_orders.len(),
            TableKind::TradeBook => self.live_trades.len(),
        }
    }

    fn mint_key(&mut self, table: TableKind) -> String {
        match table {
            TableKind::OrderBook => {
                self.next_order += 1;
                let key = format!("ORD{:07}", self.next_order);
                self.live_orders.push(key.clone());
                key
            }
            TableKind::TradeBook => {
                self.next_trade += 1;
                let key = format!("TRD{:07}", self.next_trade);
                self.live_trades.push(key.clone());
                key
            }
        }
    }

    fn pick_live_key(&mut self, table: TableKind) -> String {
        let live = match table {
            TableKind::OrderBook => &self.live_orders,
            TableKind::TradeBook => &self.live_trades,
        };
        live.choose(&mut self.rng).cloned().unwrap_or_default()
    }

    fn take_live_key(&mut self, table: TableKind) -> String {
        let live = match table {
            TableKind::OrderBook => &mut self.live_orders,
            TableKind::TradeBook => &mut self.live_trades,
        };
        let idx = self.rng.gen_range(0..live.len());
        live.swap_remove(idx)
    }

    fn symbol(&mut self) -> String {
        self.config
            .symbols
            .choose(&mut self.rng)
            .cloned()
            .unwrap_or_else(|| "AAPL".to_string())
    }

    fn price(&mut self) -> Decimal {
        // Two decimal places between 10.00 and 5000.00
        Decimal::new(self.rng.gen_range(1_000..500_000), 2)
    }

    /// Assemble the 50-field payload for an insert/update.
    fn payload_for(&mut self, table: TableKind, key: &str) -> String {
        match table {
            TableKind::OrderBook => self.order_fields(key).join(","),
            TableKind::TradeBook => self.trade_fields(key).join(","),
        }
    }

    fn order_fields(&mut self, key: &str) -> Vec<String> {
        let symbol = self.symbol();
        let price = self.price();
        let quantity = self.rng.gen_range(1..10_000i64);
        let filled = self.rng.gen_range(0..=quantity);
        let spread = Decimal::new(self.rng.gen_range(1..100), 2);

        let mut fields = vec![
            key.to_string(),
            symbol,
            pick(&mut self.rng, &["Buy", "Sell"]),
            price.to_string(),
            quantity.to_string(),
            self.clock_ms.to_string(),
            pick(&mut self.rng, &["Active", "PartiallyFilled", "Pending"]),
            pick(&mut self.rng, &["Limit", "Market", "Stop"]),
            pick(&mut self.rng, &["GTC", "IOC", "FOK", "Day"]),
            (price - spread).to_string(),
            (price + spread).to_string(),
            filled.to_string(),
            (quantity - filled).to_string(),
            price.to_string(),
            pick(&mut self.rng, &["NYSE", "NASDAQ", "ARCA"]),
            format!("CLI{:04}", self.rng.gen_range(0..1_000)),
            format!("ACC{:04}", self.rng.gen_range(0..1_000)),
            format!("TRD{:03}", self.rng.gen_range(0..100)),
            pick(&mut self.rng, &["Momentum", "MeanRev", "Arb"]),
            format!("PF{:02}", self.rng.gen_range(0..20)),
            Decimal::new(self.rng.gen_range(10_000..1_000_000), 2).to_string(),
            Decimal::new(self.rng.gen_range(0..500_000), 2).to_string(),
            format!("RG{}", self.rng.gen_range(1..10)),
            Decimal::new(self.rng.gen_range(0..100_000), 2).to_string(),
            "USD".to_string(),
            (price - spread).to_string(),
            (price + spread).to_string(),
            price.to_string(),
            spread.to_string(),
            self.rng.gen_range(1..5_000i64).to_string(),
            self.rng.gen_range(1..5_000i64).to_string(),
            price.to_string(),
            self.rng.gen_range(0..1_000_000i64).to_string(),
            price.to_string(),
        ];
        for n in 1..=10 {
            fields.push(format!("tag{}-{}", n, self.rng.gen_range(0..100)));
        }
        for _ in 0..5 {
            fields.push(Decimal::new(self.rng.gen_range(0..10_000), 2).to_string());
        }
        fields.push(self.rng.gen_range(0..1_000i64).to_string());
        fields
    }

    fn trade_fields(&mut self, key: &str) -> Vec<String> {
        let symbol = self.symbol();
        let price = self.price();
        let quantity = self.rng.gen_range(1..10_000i64);
        let commission = Decimal::new(self.rng.gen_range(0..10_000), 2);

        let mut fields = vec![
            key.to_string(),
            symbol,
            pick(&mut self.rng, &["Buy", "Sell"]),
            price.to_string(),
            quantity.to_string(),
            self.clock_ms.to_string(),
            pick(&mut self.rng, &["Executed", "Settled", "Pending"]),
            format!("ORD{:07}", self.rng.gen_range(1..1_000_000)),
            format!("ORD{:07}", self.rng.gen_range(1..1_000_000)),
            commission.to_string(),
            Decimal::new(self.rng.gen_range(0..1_000), 2).to_string(),
            (price * Decimal::from(quantity)).to_string(),
            (self.clock_ms + 172_800_000).to_string(), // T+2
            pick(&mut self.rng, &["DTCC", "OCC"]),
            pick(&mut self.rng, &["NYSE", "NASDAQ", "ARCA"]),
            format!("BUY{:04}", self.rng.gen_range(0..1_000)),
            format!("SEL{:04}", self.rng.gen_range(0..1_000)),
            format!("ACC{:04}", self.rng.gen_range(0..1_000)),
            format!("ACC{:04}", self.rng.gen_range(0..1_000)),
            pick(&mut self.rng, &["BRK1", "BRK2", "BRK3"]),
            format!("RG{}", self.rng.gen_range(1..10)),
            Decimal::new(self.rng.gen_range(0..500_000), 2).to_string(),
            pick(&mut self.rng, &["Cleared", "Review"]),
            pick(&mut self.rng, &["Reported", "Pending"]),
            "USD".to_string(),
            price.to_string(),
            Decimal::new(self.rng.gen_range(0..100), 2).to_string(),
            Decimal::new(self.rng.gen_range(0..100), 2).to_string(),
            self.rng.gen_range(0..1_000_000i64).to_string(),
            price.to_string(),
            price.to_string(),
            pick(&mut self.rng, &["Regular", "Cross", "Odd"]),
        ];
        for n in 1..=10 {
            fields.push(format!("tag{}-{}", n, self.rng.gen_range(0..100)));
        }
        for _ in 0..5 {
            fields.push(Decimal::new(self.rng.gen_range(0..10_000), 2).to_string());
        }
        for _ in 0..3 {
            fields.push(self.rng.gen_range(0..1_000i64).to_string());
        }
        fields
    }
}

fn pick(rng: &mut ChaCha8Rng, options: &[&str]) -> String {
    options.choose(rng).map(|s| s.to_string()).unwrap_or_default()
}
