//! Call list output.
//!
//! Every cell is an attribute value of the call. Table cells are clipped
//! to the attribute's display width and colored by its colorizer.

use std::io::Write;

use clap::ValueEnum;
use comfy_table::{Attribute, Cell, Color as TableColor, Table};

use sipscope_core::attribute::{self, AttrColor, AttributeId, Color};
use sipscope_core::config::DisplaySettings;
use sipscope_core::storage::CallRef;

/// Supported output formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    /// Pretty-printed table (default)
    Table,
    /// Comma-separated values
    Csv,
}

/// Formats a call list.
pub struct OutputFormatter {
    format: OutputFormat,
    columns: Vec<AttributeId>,
    display: DisplaySettings,
}

impl OutputFormatter {
    pub fn new(format: OutputFormat, columns: Vec<AttributeId>, display: DisplaySettings) -> Self {
        Self {
            format,
            columns,
            display,
        }
    }

    /// Write `calls` in the configured format.
    pub fn write<W: Write>(&self, calls: &[CallRef], writer: &mut W) -> std::io::Result<()> {
        let rows = self.rows(calls);
        match self.format {
            OutputFormat::Table => self.write_table(&rows, writer),
            OutputFormat::Csv => self.write_csv(&rows, writer),
        }
    }

    /// Attribute values per call, empty when absent.
    fn rows(&self, calls: &[CallRef]) -> Vec<Vec<String>> {
        calls
            .iter()
            .map(|call| {
                let call = call.read();
                self.columns
                    .iter()
                    .map(|id| call.attribute(*id).unwrap_or_default())
                    .collect()
            })
            .collect()
    }

    fn write_table<W: Write>(&self, rows: &[Vec<String>], writer: &mut W) -> std::io::Result<()> {
        let mut table = Table::new();
        table.set_header(self.columns.iter().map(|id| Cell::new(attribute::title(*id))));

        for row in rows {
            table.add_row(
                self.columns
                    .iter()
                    .zip(row)
                    .map(|(id, value)| self.cell(*id, value)),
            );
        }

        writeln!(writer, "{table}")
    }

    fn cell(&self, id: AttributeId, value: &str) -> Cell {
        let cell = Cell::new(clip(value, attribute::width(id)));
        match attribute::color(id, value, &self.display) {
            Some(AttrColor { color, bold }) => {
                let cell = cell.fg(table_color(color));
                if bold {
                    cell.add_attribute(Attribute::Bold)
                } else {
                    cell
                }
            }
            None => cell,
        }
    }

    fn write_csv<W: Write>(&self, rows: &[Vec<String>], writer: &mut W) -> std::io::Result<()> {
        let headers: Vec<&str> = self.columns.iter().map(|id| attribute::name(*id)).collect();
        writeln!(writer, "{}", headers.join(","))?;

        for row in rows {
            let values: Vec<String> = row
                .iter()
                .map(|value| {
                    // Escape commas and quotes
                    if value.contains(',') || value.contains('"') || value.contains('\n') {
                        format!("\"{}\"", value.replace('"', "\"\""))
                    } else {
                        value.clone()
                    }
                })
                .collect();
            writeln!(writer, "{}", values.join(","))?;
        }

        Ok(())
    }
}

/// Cut `value` to at most `width` characters.
fn clip(value: &str, width: usize) -> &str {
    match value.char_indices().nth(width) {
        Some((end, _)) => &value[..end],
        None => value,
    }
}

fn table_color(color: Color) -> TableColor {
    match color {
        Color::Red => TableColor::Red,
        Color::Green => TableColor::Green,
        Color::Yellow => TableColor::Yellow,
        Color::Blue => TableColor::Blue,
        Color::Magenta => TableColor::Magenta,
        Color::Cyan => TableColor::Cyan,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;
    use std::sync::Arc;

    use sipscope_core::dissect::{Dissected, Dissector};
    use sipscope_core::packet::FrameHeader;
    use sipscope_core::protocol::test_utils::udp_frame;
    use sipscope_core::storage::Storage;

    fn storage_with_call(call_id: &str) -> Arc<Storage> {
        let invite = format!(
            "INVITE sip:bob@example.com SIP/2.0\r\n\
             Call-ID: {call_id}\r\n\
             From: <sip:alice@example.com>;tag=1\r\n\
             To: <sip:bob@example.com>\r\n\
             CSeq: 1 INVITE\r\n\
             Content-Length: 0\r\n\r\n"
        );
        let frame = udp_frame(
            (Ipv4Addr::new(10, 0, 0, 1), 5060),
            (Ipv4Addr::new(10, 0, 0, 2), 5060),
            invite.as_bytes(),
        );

        let storage = Arc::new(Storage::default());
        let mut dissector = Dissector::default();
        for dissected in dissector.dissect(1, FrameHeader::default(), &frame) {
            if let Dissected::Sip { packet, sip } = dissected {
                storage.check_packet(packet, sip);
            }
        }
        storage
    }

    fn render(format: OutputFormat, columns: Vec<AttributeId>, call_id: &str) -> String {
        let storage = storage_with_call(call_id);
        let formatter = OutputFormatter::new(format, columns, DisplaySettings { colorize: false });
        let mut output = Vec::new();
        formatter.write(&storage.calls(), &mut output).unwrap();
        String::from_utf8(output).unwrap()
    }

    #[test]
    fn test_table_output() {
        let output = render(
            OutputFormat::Table,
            vec![AttributeId::CallIndex, AttributeId::SipFrom, AttributeId::CallState],
            "table@example.com",
        );

        assert!(output.contains("Idx"));
        assert!(output.contains("SIP From"));
        assert!(output.contains("alice@example.com"));
        assert!(output.contains("CALL SETUP"));
    }

    #[test]
    fn test_table_clips_to_width() {
        let long_id = "x".repeat(80);
        let output = render(OutputFormat::Table, vec![AttributeId::CallId], &long_id);

        assert!(output.contains(&"x".repeat(50)));
        assert!(!output.contains(&"x".repeat(51)));
    }

    #[test]
    fn test_csv_output() {
        let output = render(
            OutputFormat::Csv,
            vec![AttributeId::CallIndex, AttributeId::Method, AttributeId::CallId],
            "a,b@example.com",
        );

        let lines: Vec<&str> = output.lines().collect();
        assert_eq!(lines[0], "index,method,callid");
        assert_eq!(lines[1], "1,INVITE,\"a,b@example.com\"");
    }

    #[test]
    fn test_clip() {
        assert_eq!(clip("abcdef", 3), "abc");
        assert_eq!(clip("ab", 3), "ab");
        assert_eq!(clip("ñandú", 2), "ña");
    }
}
