use std::cell::RefCell;
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::rc::Rc;

use crate::config::*;
use crate::js_regex::*;
use crate::report::*;
use crate::runtime_state::*;
use crate::runtime_values::*;
use crate::script_ast::*;
use crate::{Error, Result, ThrownValue};

pub(crate) mod analysis;
pub(crate) mod parser;
pub(crate) mod runtime;
