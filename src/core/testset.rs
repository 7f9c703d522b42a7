use crate::core::{
    domain::TestData,
    errors::TestSetError,
    verdict::{IcpcVerdict, TestVerdict},
};

pub type ProgressCallback = Box<dyn Fn(u32) + Send + Sync>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Test {
    /// Caller assigned, 1-based.
    pub number: u32,
    pub input: TestData,
    pub answer: TestData,
    pub verdict: Option<TestVerdict>,
}

impl Test {
    pub fn new(number: u32, input: TestData, answer: TestData) -> Self {
        Self {
            number,
            input,
            answer,
            verdict: None,
        }
    }

    pub fn record_verdict(&mut self, verdict: TestVerdict) -> Result<(), TestSetError> {
        if self.verdict.is_some() {
            return Err(TestSetError::VerdictAlreadyRecorded {
                number: self.number,
            });
        }
        self.verdict = Some(verdict);
        Ok(())
    }
}

/// Ordered iteration over tests, driven one test at a time.
///
/// The driver calls `rewind` once, then `advance` repeatedly, judging
/// each yielded test before asking for the next one.
pub trait TestSuite: Send {
    fn rewind(&mut self);

    fn advance(&mut self) -> Result<Option<&mut Test>, TestSetError>;

    /// Verdicts of every test judged so far, in stored order.
    fn verdicts(&self) -> Vec<TestVerdict>;
}

pub struct TestSet {
    tests: Vec<Test>,
    on_next: Vec<ProgressCallback>,
    cursor: Option<usize>,
}

impl std::fmt::Debug for TestSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TestSet")
            .field("tests", &self.tests)
            .field("on_next", &self.on_next.len())
            .field("cursor", &self.cursor)
            .finish()
    }
}

impl TestSet {
    pub fn new(tests: Vec<Test>) -> Self {
        Self {
            tests,
            on_next: Vec::new(),
            cursor: None,
        }
    }

    /// Registers a callback invoked with a test's number right before the
    /// test is yielded.
    pub fn add_on_next(&mut self, callback: impl Fn(u32) + Send + Sync + 'static) {
        self.on_next.push(Box::new(callback));
    }

    pub fn tests(&self) -> &[Test] {
        &self.tests
    }

    pub fn len(&self) -> usize {
        self.tests.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tests.is_empty()
    }

    /// Most recently yielded test.
    fn current(&self) -> Option<&Test> {
        self.cursor.and_then(|index| self.tests.get(index))
    }

    /// Moves to the next test and notifies callbacks. Returns its index.
    fn step(&mut self) -> Option<usize> {
        let next = self.cursor.map_or(0, |index| index + 1);
        if next >= self.tests.len() {
            self.cursor = Some(self.tests.len());
            return None;
        }
        self.cursor = Some(next);
        let number = self.tests[next].number;
        for callback in &self.on_next {
            callback(number);
        }
        Some(next)
    }
}

impl TestSuite for TestSet {
    fn rewind(&mut self) {
        self.cursor = None;
    }

    fn advance(&mut self) -> Result<Option<&mut Test>, TestSetError> {
        Ok(self.step().map(|index| &mut self.tests[index]))
    }

    fn verdicts(&self) -> Vec<TestVerdict> {
        self.tests
            .iter()
            .filter_map(|test| test.verdict.clone())
            .collect()
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum IcpcState {
    NotStarted,
    Running,
    Terminated(IcpcVerdict),
}

/// Test set graded by ICPC rules: iteration stops at the first test
/// whose verdict is not ok.
#[derive(Debug)]
pub struct IcpcTestSet {
    tests: TestSet,
    state: IcpcState,
}

impl IcpcTestSet {
    pub fn new(tests: Vec<Test>) -> Self {
        Self {
            tests: TestSet::new(tests),
            state: IcpcState::NotStarted,
        }
    }

    pub fn add_on_next(&mut self, callback: impl Fn(u32) + Send + Sync + 'static) {
        self.tests.add_on_next(callback);
    }

    pub fn tests(&self) -> &[Test] {
        self.tests.tests()
    }

    pub fn state(&self) -> &IcpcState {
        &self.state
    }

    /// Aggregate verdict, available once iteration has terminated.
    pub fn verdict(&self) -> Option<&IcpcVerdict> {
        match &self.state {
            IcpcState::Terminated(verdict) => Some(verdict),
            _ => None,
        }
    }

    fn terminate(&mut self, verdict: IcpcVerdict) {
        tracing::debug!(status = %verdict.status, first_test_failed = ?verdict.first_test_failed, "Test set terminated");
        self.state = IcpcState::Terminated(verdict);
    }
}

impl TestSuite for IcpcTestSet {
    fn rewind(&mut self) {
        self.tests.rewind();
        self.state = IcpcState::NotStarted;
    }

    fn advance(&mut self) -> Result<Option<&mut Test>, TestSetError> {
        match self.state {
            IcpcState::Terminated(_) => return Ok(None),
            IcpcState::NotStarted => {}
            IcpcState::Running => {
                if let Some(previous) = self.tests.current() {
                    let number = previous.number;
                    let verdict = previous
                        .verdict
                        .as_ref()
                        .ok_or(TestSetError::NoVerdict { number })?;
                    if !verdict.is_ok() {
                        let status = verdict.status.clone();
                        self.terminate(IcpcVerdict::failed(&status, self.verdicts(), number));
                        return Ok(None);
                    }
                }
            }
        }

        match self.tests.step() {
            Some(index) => {
                self.state = IcpcState::Running;
                Ok(Some(&mut self.tests.tests[index]))
            }
            None => {
                self.terminate(IcpcVerdict::accepted(self.verdicts()));
                Ok(None)
            }
        }
    }

    fn verdicts(&self) -> Vec<TestVerdict> {
        self.tests.verdicts()
    }
}
