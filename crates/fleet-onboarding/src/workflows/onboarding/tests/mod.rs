mod common;
mod induction;
