//! Result reporting: the evaluation result, feedback for the generator,
//! display rendering and sinks.

pub mod feedback;
pub mod reporter;
pub mod result;
pub mod sink;

pub use feedback::{DimensionFeedback, Feedback, FeedbackFormatter, GateFeedback};
pub use reporter::{PassRecord, ResultReporter, prioritize, render_report, summarize};
pub use result::{BestEffort, EvaluationResult, Priority, RecommendedAction, Termination, Todo};
pub use sink::{EmittedRecord, JsonlSink, MemorySink, ResultSink};
