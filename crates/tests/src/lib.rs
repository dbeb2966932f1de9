pub mod fixtures;

#[cfg(test)]
mod scenario_tests;
#[cfg(test)]
mod relay_property_tests;
#[cfg(test)]
mod registry_property_tests;
