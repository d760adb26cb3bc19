use http_tap::{BodyStart, BoxError, ConnectionId, Direction, HeadersOutcome, HttpMessage, ParserCallbacks};

#[derive(Debug, Copy, Clone)]
pub struct TestCase {
    name: &'static str,
    fragment: Fragment,
    file: TestFile,
}

impl TestCase {
    pub fn new(name: &'static str, fragment: Fragment, file: TestFile) -> Self {
        Self { name, fragment, file }
    }

    pub fn whole(name: &'static str, file: TestFile) -> Self {
        Self::new(name, Fragment::Whole, file)
    }

    pub fn segments(name: &'static str, size: usize, file: TestFile) -> Self {
        Self::new(name, Fragment::Segments(size), file)
    }

    pub fn name(&self) -> &'static str {
        self.name
    }

    pub fn fragment(&self) -> Fragment {
        self.fragment
    }

    pub fn file(&self) -> &TestFile {
        &self.file
    }

    /// The capture cut the way this case feeds it.
    pub fn pieces(&self) -> Vec<&'static [u8]> {
        match self.fragment {
            Fragment::Whole => vec![self.file.content],
            Fragment::Segments(size) => self.file.content.chunks(size.max(1)).collect(),
        }
    }
}

/// One direction of a captured connection.
#[derive(Debug, Copy, Clone)]
pub struct TestFile {
    file_name: &'static str,
    direction: Direction,
    content: &'static [u8],
}

impl TestFile {
    pub const fn new(file_name: &'static str, direction: Direction, content: &'static [u8]) -> Self {
        Self { file_name, direction, content }
    }

    pub fn content(&self) -> &'static [u8] {
        self.content
    }

    pub fn direction(&self) -> Direction {
        self.direction
    }

    pub fn file_name(&self) -> &'static str {
        self.file_name
    }
}

/// How a capture is split into `input` calls.
#[derive(Clone, Copy, Debug)]
pub enum Fragment {
    Whole,
    Segments(usize),
}

/// Callbacks that only count what they are given.
#[derive(Debug, Default)]
pub struct Sink {
    pub messages: usize,
    pub body_bytes: usize,
    pub decode: bool,
}

impl Sink {
    fn received(&mut self) -> HeadersOutcome {
        self.messages += 1;
        HeadersOutcome::Proceed
    }

    fn data(&mut self, data: &[u8]) -> Result<(), BoxError> {
        self.body_bytes += data.len();
        Ok(())
    }
}

impl ParserCallbacks for Sink {
    fn on_request_received(&mut self, _id: ConnectionId, _message: HttpMessage) -> HeadersOutcome {
        self.received()
    }

    fn on_request_body_started(&mut self, _id: ConnectionId) -> BodyStart {
        BodyStart { decode: self.decode }
    }

    fn on_request_body_data(&mut self, _id: ConnectionId, data: &[u8]) -> Result<(), BoxError> {
        self.data(data)
    }

    fn on_request_body_finished(&mut self, _id: ConnectionId) {}

    fn on_response_received(&mut self, _id: ConnectionId, _message: HttpMessage) -> HeadersOutcome {
        self.received()
    }

    fn on_response_body_started(&mut self, _id: ConnectionId) -> BodyStart {
        BodyStart { decode: self.decode }
    }

    fn on_response_body_data(&mut self, _id: ConnectionId, data: &[u8]) -> Result<(), BoxError> {
        self.data(data)
    }

    fn on_response_body_finished(&mut self, _id: ConnectionId) {}
}
