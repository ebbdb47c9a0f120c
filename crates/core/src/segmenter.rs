//! SMS segmentation and cost estimation.
//!
//! Carrier-accurate segment counting for a message body: GSM-7 when every
//! character is in the GSM 03.38 default alphabet (extension-table
//! characters weigh two septets), UCS-2 otherwise. Cost is a tunable
//! per-segment rate multiplied out over the recipient count.

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Segment capacities
// ---------------------------------------------------------------------------

/// Maximum GSM-7 septets in a single, unconcatenated segment.
pub const GSM7_SINGLE_SEGMENT: usize = 160;
/// GSM-7 septets per segment once a message is concatenated (7 go to the UDH).
pub const GSM7_MULTIPART_SEGMENT: usize = 153;
/// Maximum UCS-2 characters in a single segment.
pub const UCS2_SINGLE_SEGMENT: usize = 70;
/// UCS-2 characters per segment once a message is concatenated.
pub const UCS2_MULTIPART_SEGMENT: usize = 67;

// ---------------------------------------------------------------------------
// Pricing defaults
// ---------------------------------------------------------------------------

/// Default carrier base rate per outbound segment (USD).
pub const DEFAULT_BASE_RATE: f64 = 0.0083;
/// Default average carrier pass-through fee per segment (USD).
pub const DEFAULT_CARRIER_FEE: f64 = 0.0030;

// ---------------------------------------------------------------------------
// Alphabet
// ---------------------------------------------------------------------------

/// GSM 03.38 default alphabet (one septet each), without ESC.
const GSM7_BASIC: &str = "@£$¥èéùìòÇ\nØø\rÅåΔ_ΦΓΛΩΠΨΣΘΞÆæßÉ !\"#¤%&'()*+,-./0123456789:;<=>?\
¡ABCDEFGHIJKLMNOPQRSTUVWXYZÄÖÑÜ§¿abcdefghijklmnopqrstuvwxyzäöñüà";

/// GSM 03.38 extension table (escape + septet, so two each).
const GSM7_EXTENDED: &str = "^{}\\[~]|€\u{000C}";

/// Septet weight of `c` in GSM-7, or `None` if it cannot be represented.
pub fn gsm7_weight(c: char) -> Option<usize> {
    if GSM7_BASIC.contains(c) {
        Some(1)
    } else if GSM7_EXTENDED.contains(c) {
        Some(2)
    } else {
        None
    }
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Text encoding a carrier will use for a message body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmsEncoding {
    Gsm7,
    Ucs2,
}

impl SmsEncoding {
    /// Human-readable label for display in the UI.
    pub fn label(self) -> &'static str {
        match self {
            Self::Gsm7 => "GSM-7",
            Self::Ucs2 => "UCS-2",
        }
    }

    fn capacities(self) -> (usize, usize) {
        match self {
            Self::Gsm7 => (GSM7_SINGLE_SEGMENT, GSM7_MULTIPART_SEGMENT),
            Self::Ucs2 => (UCS2_SINGLE_SEGMENT, UCS2_MULTIPART_SEGMENT),
        }
    }
}

impl std::fmt::Display for SmsEncoding {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.label())
    }
}

/// Determine the encoding for the whole message. A single character outside
/// the GSM-7 alphabet forces UCS-2 for every character.
pub fn detect_encoding(message: &str) -> SmsEncoding {
    if message.chars().all(|c| gsm7_weight(c).is_some()) {
        SmsEncoding::Gsm7
    } else {
        SmsEncoding::Ucs2
    }
}

/// Length of `message` in billable units for the given encoding.
pub fn billable_length(message: &str, encoding: SmsEncoding) -> usize {
    match encoding {
        SmsEncoding::Gsm7 => message.chars().map(|c| gsm7_weight(c).unwrap_or(1)).sum(),
        SmsEncoding::Ucs2 => message.chars().count(),
    }
}

/// Number of segments needed for `length` billable units.
pub fn segments_for(length: usize, encoding: SmsEncoding) -> u32 {
    let (single, multipart) = encoding.capacities();
    if length == 0 {
        0
    } else if length <= single {
        1
    } else {
        length.div_ceil(multipart) as u32
    }
}

// ---------------------------------------------------------------------------
// Pricing
// ---------------------------------------------------------------------------

/// Per-segment price: carrier base rate plus average pass-through fee.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct SegmentPricing {
    pub base_rate: f64,
    pub carrier_fee: f64,
}

impl SegmentPricing {
    pub fn new(base_rate: f64, carrier_fee: f64) -> Self {
        Self {
            base_rate,
            carrier_fee,
        }
    }

    /// Total price of one segment.
    pub fn per_segment(&self) -> f64 {
        self.base_rate + self.carrier_fee
    }
}

impl Default for SegmentPricing {
    fn default() -> Self {
        Self::new(DEFAULT_BASE_RATE, DEFAULT_CARRIER_FEE)
    }
}

// ---------------------------------------------------------------------------
// Estimate
// ---------------------------------------------------------------------------

/// Segment and cost estimate for one message sent to a number of recipients.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SmsEstimate {
    pub segments: u32,
    pub encoding: SmsEncoding,
    /// Characters as typed.
    pub char_count: usize,
    /// Characters as billed (GSM-7 extension characters count twice).
    pub billable_length: usize,
    pub recipient_count: u32,
    pub total_segments: u64,
    pub cost_per_message: f64,
    pub total_cost: f64,
}

/// Estimate segments and cost for `message` sent to `recipient_count`
/// recipients. A zero count is treated as one.
pub fn estimate(message: &str, recipient_count: u32, pricing: &SegmentPricing) -> SmsEstimate {
    let recipient_count = recipient_count.max(1);
    let encoding = detect_encoding(message);
    let billable = billable_length(message, encoding);
    let segments = segments_for(billable, encoding);
    let cost_per_message = segments as f64 * pricing.per_segment();

    SmsEstimate {
        segments,
        encoding,
        char_count: message.chars().count(),
        billable_length: billable,
        recipient_count,
        total_segments: u64::from(segments) * u64::from(recipient_count),
        cost_per_message,
        total_cost: cost_per_message * recipient_count as f64,
    }
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------
