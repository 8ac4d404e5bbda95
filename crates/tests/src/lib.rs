pub mod fixtures;

#[cfg(test)]
mod consumer_tests;
#[cfg(test)]
mod reconciler_tests;
#[cfg(test)]
mod pipeline_tests;
