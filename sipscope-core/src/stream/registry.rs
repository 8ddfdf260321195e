use super::{StreamContext, StreamParser};

/// Registry of available stream parsers, tried in registration order.
pub struct StreamRegistry {
    parsers: Vec<Box<dyn StreamParser>>,
}

impl StreamRegistry {
    pub fn new() -> Self {
        Self {
            parsers: Vec::new(),
        }
    }

    pub fn register<P: StreamParser + 'static>(&mut self, parser: P) {
        self.parsers.push(Box::new(parser));
    }

    /// First parser willing to look at this stream.
    pub fn find_parser<'a>(&'a self, context: &'a StreamContext) -> Option<&'a dyn StreamParser> {
        self.candidates(context).next()
    }

    /// All parsers willing to look at this stream, in registration order.
    pub fn candidates<'a>(
        &'a self,
        context: &'a StreamContext,
    ) -> impl Iterator<Item = &'a dyn StreamParser> + 'a {
        self.parsers
            .iter()
            .filter(move |p| p.can_parse_stream(context))
            .map(|p| p.as_ref())
    }

    pub fn get_parser(&self, name: &str) -> Option<&dyn StreamParser> {
        self.parsers
            .iter()
            .find(|p| p.name() == name)
            .map(|p| p.as_ref())
    }

    pub fn parser_names(&self) -> Vec<&'static str> {
        self.parsers.iter().map(|p| p.name()).collect()
    }
}

impl Default for StreamRegistry {
    fn default() -> Self {
        Self::new()
    }
}
