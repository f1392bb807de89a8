//! Fixed 50-column table schemas
//!
//! Two tables exist, order book and trade book. Their column names differ
//! but both are exactly [`COLUMN_COUNT`] columns wide: column 0 is the
//! business key used for upsert/delete addressing and column 1 is the
//! symbol column targeted by substring search.

use crate::cell::ColumnType;
use crate::cell::ColumnType::{Decimal, Integer, Text, Timestamp};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Every table is exactly this many columns wide.
pub const COLUMN_COUNT: usize = 50;

/// Index of the business-key column.
pub const KEY_COLUMN: usize = 0;

/// Index of the searchable symbol column.
pub const SYMBOL_COLUMN: usize = 1;

/// Which of the two tables a message or row belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TableKind {
    OrderBook,
    TradeBook,
}

impl TableKind {
    /// Decode a wire token. Unknown tokens default to `OrderBook`;
    /// the decoder is permissive by contract.
    pub fn from_wire(token: &str) -> Self {
        match token {
            "TradeBook" => TableKind::TradeBook,
            _ => TableKind::OrderBook,
        }
    }

    /// The fixed schema for this table.
    pub fn schema(&self) -> &'static TableSchema {
        match self {
            TableKind::OrderBook => &ORDER_BOOK,
            TableKind::TradeBook => &TRADE_BOOK,
        }
    }
}

impl fmt::Display for TableKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TableKind::OrderBook => write!(f, "OrderBook"),
            TableKind::TradeBook => write!(f, "TradeBook"),
        }
    }
}

/// One column of a table schema.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
}

const fn col(name: &'static str, ty: ColumnType) -> Column {
    Column { name, ty }
}

/// A named, fixed, ordered schema of exactly [`COLUMN_COUNT`] columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableSchema {
    pub name: &'static str,
    pub columns: [Column; COLUMN_COUNT],
}

impl TableSchema {
    /// Declared type of a column, or `None` out of range.
    pub fn column_type(&self, index: usize) -> Option<ColumnType> {
        self.columns.get(index).map(|c| c.ty)
    }

    /// Column name, or `None` out of range.
    pub fn column_name(&self, index: usize) -> Option<&'static str> {
        self.columns.get(index).map(|c| c.name)
    }
}

/// Order book schema: key `OrderId`, symbol `Symbol`.
pub static ORDER_BOOK: TableSchema = TableSchema {
    name: "order_book",
    columns: [
        col("OrderId", Text),
        col("Symbol", Text),
        col("Side", Text),
        col("Price", Decimal),
        col("Quantity", Integer),
        col("Timestamp", Timestamp),
        col("Status", Text),
        col("OrderType", Text),
        col("TimeInForce", Text),
        col("StopPrice", Decimal),
        col("LimitPrice", Decimal),
        col("FilledQuantity", Integer),
        col("RemainingQuantity", Integer),
        col("AvgFillPrice", Decimal),
        col("Exchange", Text),
        col("ClientId", Text),
        col("AccountId", Text),
        col("TraderId", Text),
        col("Strategy", Text),
        col("Portfolio", Text),
        col("RiskLimit", Decimal),
        col("ExposureAmount", Decimal),
        col("RiskGroup", Text),
        col("MarginRequirement", Decimal),
        col("Currency", Text),
        col("BidPrice", Decimal),
        col("AskPrice", Decimal),
        col("MidPrice", Decimal),
        col("SpreadBps", Decimal),
        col("BidSize", Integer),
        col("AskSize", Integer),
        col("LastPrice", Decimal),
        col("Volume", Integer),
        col("VWAP", Decimal),
        col("Tag1", Text),
        col("Tag2", Text),
        col("Tag3", Text),
        col("Tag4", Text),
        col("Tag5", Text),
        col("Tag6", Text),
        col("Tag7", Text),
        col("Tag8", Text),
        col("Tag9", Text),
        col("Tag10", Text),
        col("Value1", Decimal),
        col("Value2", Decimal),
        col("Value3", Decimal),
        col("Value4", Decimal),
        col("Value5", Decimal),
        col("Counter1", Integer),
    ],
};

/// Trade book schema: key `TradeId`, symbol `Symbol`.
pub static TRADE_BOOK: TableSchema = TableSchema {
    name: "trade_book",
    columns: [
        col("TradeId", Text),
        col("Symbol", Text),
        col("Side", Text),
        col("Price", Decimal),
        col("Quantity", Integer),
        col("Timestamp", Timestamp),
        col("Status", Text),
        col("BuyOrderId", Text),
        col("SellOrderId", Text),
        col("Commission", Decimal),
        col("Fees", Decimal),
        col("NetAmount", Decimal),
        col("SettlementDate", Timestamp),
        col("ClearingFirm", Text),
        col("Exchange", Text),
        col("BuyerId", Text),
        col("SellerId", Text),
        col("BuyerAccount", Text),
        col("SellerAccount", Text),
        col("ExecutingBroker", Text),
        col("RiskGroup", Text),
        col("ExposureImpact", Decimal),
        col("ComplianceStatus", Text),
        col("RegReportingStatus", Text),
        col("Currency", Text),
        col("MarketPrice", Decimal),
        col("PriceDeviation", Decimal),
        col("MarketImpact", Decimal),
        col("MarketVolume", Integer),
        col("VWAP", Decimal),
        col("TWAPPrice", Decimal),
        col("TradeCondition", Text),
        col("Tag1", Text),
        col("Tag2", Text),
        col("Tag3", Text),
        col("Tag4", Text),
        col("Tag5", Text),
        col("Tag6", Text),
        col("Tag7", Text),
        col("Tag8", Text),
        col("Tag9", Text),
        col("Tag10", Text),
        col("Value1", Decimal),
        col("Value2", Decimal),
        col("Value3", Decimal),
        col("Value4", Decimal),
        col("Value5", Decimal),
        col("Counter1", Integer),
        col("Counter2", Integer),
        col("Counter3", Integer),
    ],
};

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_both_schemas_are_fifty_wide() {
        assert_eq!(ORDER_BOOK.columns.len(), COLUMN_COUNT);
        assert_eq!(TRADE_BOOK.columns.len(), COLUMN_COUNT);
    }

    #[test]
    fn test_key_and_symbol_columns() {
        assert_eq!(ORDER_BOOK.column_name(KEY_COLUMN), Some("OrderId"));
        assert_eq!(TRADE_BOOK.column_name(KEY_COLUMN), Some("TradeId"));
        assert_eq!(ORDER_BOOK.column_name(SYMBOL_COLUMN), Some("Symbol"));
        assert_eq!(TRADE_BOOK.column_name(SYMBOL_COLUMN), Some("Symbol"));
    }

    #[test]
    fn test_wire_decode_is_permissive() {
        assert_eq!(TableKind::from_wire("OrderBook"), TableKind::OrderBook);
        assert_eq!(TableKind::from_wire("TradeBook"), TableKind::TradeBook);
        // Unknown tokens fall back to the order book
        assert_eq!(TableKind::from_wire("PositionBook"), TableKind::OrderBook);
        assert_eq!(TableKind::from_wire(""), TableKind::OrderBook);
    }

    #[test]
    fn test_wire_name_round_trip() {
        for kind in [TableKind::OrderBook, TableKind::TradeBook] {
            assert_eq!(TableKind::from_wire(&kind.to_string()), kind);
        }
    }

    #[test]
    fn test_column_type_out_of_range() {
        assert_eq!(ORDER_BOOK.column_type(COLUMN_COUNT), None);
        assert_eq!(ORDER_BOOK.column_type(3), Some(ColumnType::Decimal));
    }
}
