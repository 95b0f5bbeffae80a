//! Reflective member access used by the interpreter.

use std::sync::Arc;

use arbor_ir::{CtorDef, MemberDef, MethodDef, Value};

use crate::errors::EvalResult;

/// How the interpreter reaches host code for methods, members and
/// constructors.
pub trait Reflector: Send + Sync {
    fn invoke_method(
        &self,
        method: &Arc<MethodDef>,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> EvalResult;

    fn read_member(&self, member: &Arc<MemberDef>, receiver: Option<&Value>) -> EvalResult;

    fn construct(&self, ctor: &Arc<CtorDef>, args: &[Value]) -> EvalResult;
}

/// Calls the host closures registered on the definitions, dispatching
/// virtual members on the receiver's runtime class.
#[derive(Clone, Copy, Debug, Default)]
pub struct NativeReflector;

impl Reflector for NativeReflector {
    fn invoke_method(
        &self,
        method: &Arc<MethodDef>,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> EvalResult {
        Ok(method.invoke(receiver, args)?)
    }

    fn read_member(&self, member: &Arc<MemberDef>, receiver: Option<&Value>) -> EvalResult {
        Ok(member.read(receiver)?)
    }

    fn construct(&self, ctor: &Arc<CtorDef>, args: &[Value]) -> EvalResult {
        Ok(ctor.construct(args)?)
    }
}
