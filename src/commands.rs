mod execute;
mod list;
