pub mod apex;
pub mod fruit;
pub mod internode;
pub mod leaf;
pub mod markov;
pub mod metamer;
pub mod observation;
pub mod sequences;
pub mod wood;
