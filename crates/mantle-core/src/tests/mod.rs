/*! Test coverage for the analysis core.
 *
 * The evaluator, resolver and flow graph interlock: most regressions show up
 * as a wrong resolved value or a missing graph edge rather than a crash.
 * These tests drive hand-built trees through full evaluation passes and
 * check both the values and the graph shape that come out.
 */

mod dataflow_tests;
mod helpers;
