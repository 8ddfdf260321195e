//! Command-line argument definitions.

use std::path::PathBuf;

use clap::{Parser, ValueEnum};

use sipscope_core::attribute::AttributeId;
use sipscope_core::config::{DisplaySettings, DissectorConfig, RetransPolicy, StorageConfig};
use sipscope_core::error::StorageError;
use sipscope_core::storage::CallQuery;

use super::OutputFormat;

/// Retransmission detection modes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum RetransArg {
    /// Every message updates the call
    Off,
    /// Same source, CSeq and method as an earlier message
    Loose,
    /// Loose match plus same destination and identical payload
    Strict,
}

impl From<RetransArg> for RetransPolicy {
    fn from(arg: RetransArg) -> Self {
        match arg {
            RetransArg::Off => RetransPolicy::Disabled,
            RetransArg::Loose => RetransPolicy::Loose,
            RetransArg::Strict => RetransPolicy::Strict,
        }
    }
}

/// Parse a `<attribute>=<regex>` filter.
pub fn parse_filter(s: &str) -> Result<(AttributeId, String), String> {
    let (name, pattern) = s
        .split_once('=')
        .ok_or_else(|| format!("expected <attribute>=<regex>, got '{s}'"))?;
    let id = name.trim().parse::<AttributeId>().map_err(|e| e.to_string())?;
    Ok((id, pattern.to_string()))
}

/// List the SIP calls found in a packet capture.
#[derive(Parser, Debug)]
#[command(name = "sipscope")]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// PCAP or PCAPNG file, optionally gzip-compressed
    #[arg(value_name = "FILE")]
    pub file: PathBuf,

    /// Output format for stdout
    #[arg(long = "format", value_enum, default_value = "table")]
    pub format: OutputFormat,

    /// Columns to print, by attribute name
    #[arg(
        long = "columns",
        value_name = "ATTRS",
        value_delimiter = ',',
        default_value = "index,method,sipfrom,sipto,msgcnt,src,dst,state"
    )]
    pub columns: Vec<AttributeId>,

    /// Sort calls by this attribute
    #[arg(long = "sort", value_name = "ATTR")]
    pub sort: Option<AttributeId>,

    /// Sort in descending order
    #[arg(long = "desc", requires = "sort")]
    pub desc: bool,

    /// Only list calls whose attribute matches (repeatable)
    #[arg(long = "filter", value_name = "ATTR=REGEX", value_parser = parse_filter)]
    pub filters: Vec<(AttributeId, String)>,

    /// Only store dialogs that start with an INVITE
    #[arg(long = "invite-only")]
    pub invite_only: bool,

    /// Maximum number of stored calls
    #[arg(long = "limit", default_value = "20000")]
    pub limit: usize,

    /// Evict the oldest call when the limit is reached
    #[arg(long = "rotate")]
    pub rotate: bool,

    /// Only store calls whose first message payload matches
    #[arg(long = "match", value_name = "REGEX")]
    pub match_expr: Option<String>,

    /// Store calls that do not match --match instead
    #[arg(long = "invert", requires = "match_expr")]
    pub invert: bool,

    /// Case-insensitive --match
    #[arg(long = "icase")]
    pub icase: bool,

    /// Retransmission detection
    #[arg(long = "retrans", value_enum, default_value = "loose")]
    pub retrans: RetransArg,

    /// Disable colored output
    #[arg(long = "no-color")]
    pub no_color: bool,

    /// Do not classify RTP/RTCP datagrams
    #[arg(long = "no-rtp")]
    pub no_rtp: bool,

    /// List the call with this Call-ID and the calls linked to it by X-Call-ID
    #[arg(long = "related", value_name = "CALL_ID", conflicts_with_all = ["filters", "sort"])]
    pub related: Option<String>,

    /// Enable verbose output
    #[arg(short = 'v', long = "verbose", action = clap::ArgAction::Count)]
    pub verbose: u8,
}

impl Args {
    pub fn storage_config(&self) -> StorageConfig {
        StorageConfig {
            limit: self.limit,
            rotate: self.rotate,
            invite_only: self.invite_only,
            match_expr: self.match_expr.clone(),
            match_invert: self.invert,
            match_icase: self.icase,
            // Only the call list is printed, payloads are enough
            keep_frames: false,
            retransmission: self.retrans.into(),
        }
    }

    pub fn dissector_config(&self) -> DissectorConfig {
        DissectorConfig {
            rtp: !self.no_rtp,
            ..Default::default()
        }
    }

    pub fn display_settings(&self) -> DisplaySettings {
        DisplaySettings {
            colorize: !self.no_color,
        }
    }

    /// Filters and sort order for the call list.
    pub fn query(&self) -> Result<CallQuery, StorageError> {
        let mut query = CallQuery::new();
        for (id, pattern) in &self.filters {
            query = query.filter(*id, pattern)?;
        }
        if let Some(sort) = self.sort {
            query = query.sort_by(sort, self.desc);
        }
        Ok(query)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let args = Args::parse_from(["sipscope", "calls.pcap"]);

        assert_eq!(args.format, OutputFormat::Table);
        assert_eq!(args.columns[0], AttributeId::CallIndex);
        assert_eq!(args.columns.len(), 8);
        assert_eq!(args.storage_config().limit, 20000);
        assert_eq!(args.storage_config().retransmission, RetransPolicy::Loose);
        assert!(args.dissector_config().rtp);
        assert!(args.display_settings().colorize);
    }

    #[test]
    fn test_filters_and_sort() {
        let args = Args::parse_from([
            "sipscope",
            "--filter",
            "sipfrom=^alice",
            "--filter",
            "state=COMPLETED",
            "--sort",
            "msgcnt",
            "--desc",
            "calls.pcap",
        ]);

        assert_eq!(
            args.filters,
            vec![
                (AttributeId::SipFrom, "^alice".to_string()),
                (AttributeId::CallState, "COMPLETED".to_string()),
            ]
        );
        let query = args.query().unwrap();
        assert_eq!(query.filters().len(), 2);
        assert_eq!(query.sort(), Some((AttributeId::MsgCnt, true)));
    }

    #[test]
    fn test_capture_filters() {
        let args = Args::parse_from([
            "sipscope",
            "--invite-only",
            "--limit",
            "10",
            "--rotate",
            "--match",
            "alice",
            "--invert",
            "--icase",
            "--retrans",
            "strict",
            "--no-rtp",
            "--no-color",
            "calls.pcap",
        ]);

        let config = args.storage_config();
        assert!(config.invite_only);
        assert_eq!(config.limit, 10);
        assert!(config.rotate);
        assert_eq!(config.match_expr.as_deref(), Some("alice"));
        assert!(config.match_invert);
        assert!(config.match_icase);
        assert_eq!(config.retransmission, RetransPolicy::Strict);
        assert!(!args.dissector_config().rtp);
        assert!(!args.display_settings().colorize);
    }

    #[test]
    fn test_parse_filter_errors() {
        assert!(parse_filter("sipfrom").is_err());
        assert!(parse_filter("nosuchattr=x").is_err());
        assert_eq!(
            parse_filter("callid=a=b").unwrap(),
            (AttributeId::CallId, "a=b".to_string())
        );
    }

    #[test]
    fn test_unknown_column() {
        assert!(Args::try_parse_from(["sipscope", "--columns", "index,bogus", "x.pcap"]).is_err());
    }
}
