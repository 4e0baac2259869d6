//! netfanout unit tests


mod test_engine;
mod test_structured;
mod test_topology;
