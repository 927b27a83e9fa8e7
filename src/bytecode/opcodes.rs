//! JVM opcodes
//!
//! Instruction codes as they appear in the event feed, plus pseudo codes the
//! executor records for labels and stack-map frames so idiom templates can
//! refer to them.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// An instruction code. Values below 256 are JVM opcodes; values from 300 are
/// pseudo codes recorded by the executor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Opcode(pub u16);

macro_rules! opcodes {
    ($($name:ident = $value:expr),* $(,)?) => {
        #[allow(missing_docs)]
        impl Opcode {
            $(pub const $name: Opcode = Opcode($value);)*
        }

        static TABLE: &[(&str, Opcode)] = &[$((stringify!($name), Opcode($value))),*];
    };
}

opcodes! {
    NOP = 0, ACONST_NULL = 1, ICONST_M1 = 2, ICONST_0 = 3, ICONST_1 = 4, ICONST_2 = 5,
    ICONST_3 = 6, ICONST_4 = 7, ICONST_5 = 8, LCONST_0 = 9, LCONST_1 = 10, FCONST_0 = 11,
    FCONST_1 = 12, FCONST_2 = 13, DCONST_0 = 14, DCONST_1 = 15, BIPUSH = 16, SIPUSH = 17,
    LDC = 18,
    ILOAD = 21, LLOAD = 22, FLOAD = 23, DLOAD = 24, ALOAD = 25,
    IALOAD = 46, LALOAD = 47, FALOAD = 48, DALOAD = 49, AALOAD = 50, BALOAD = 51,
    CALOAD = 52, SALOAD = 53,
    ISTORE = 54, LSTORE = 55, FSTORE = 56, DSTORE = 57, ASTORE = 58,
    IASTORE = 79, LASTORE = 80, FASTORE = 81, DASTORE = 82, AASTORE = 83, BASTORE = 84,
    CASTORE = 85, SASTORE = 86,
    POP = 87, POP2 = 88, DUP = 89, DUP_X1 = 90, DUP_X2 = 91, DUP2 = 92, DUP2_X1 = 93,
    DUP2_X2 = 94, SWAP = 95,
    IADD = 96, LADD = 97, FADD = 98, DADD = 99, ISUB = 100, LSUB = 101, FSUB = 102,
    DSUB = 103, IMUL = 104, LMUL = 105, FMUL = 106, DMUL = 107, IDIV = 108, LDIV = 109,
    FDIV = 110, DDIV = 111, IREM = 112, LREM = 113, FREM = 114, DREM = 115, INEG = 116,
    LNEG = 117, FNEG = 118, DNEG = 119, ISHL = 120, LSHL = 121, ISHR = 122, LSHR = 123,
    IUSHR = 124, LUSHR = 125, IAND = 126, LAND = 127, IOR = 128, LOR = 129, IXOR = 130,
    LXOR = 131, IINC = 132,
    I2L = 133, I2F = 134, I2D = 135, L2I = 136, L2F = 137, L2D = 138, F2I = 139, F2L = 140,
    F2D = 141, D2I = 142, D2L = 143, D2F = 144, I2B = 145, I2C = 146, I2S = 147,
    LCMP = 148, FCMPL = 149, FCMPG = 150, DCMPL = 151, DCMPG = 152,
    IFEQ = 153, IFNE = 154, IFLT = 155, IFGE = 156, IFGT = 157, IFLE = 158,
    IF_ICMPEQ = 159, IF_ICMPNE = 160, IF_ICMPLT = 161, IF_ICMPGE = 162, IF_ICMPGT = 163,
    IF_ICMPLE = 164, IF_ACMPEQ = 165, IF_ACMPNE = 166, GOTO = 167, JSR = 168, RET = 169,
    TABLESWITCH = 170, LOOKUPSWITCH = 171,
    IRETURN = 172, LRETURN = 173, FRETURN = 174, DRETURN = 175, ARETURN = 176, RETURN = 177,
    GETSTATIC = 178, PUTSTATIC = 179, GETFIELD = 180, PUTFIELD = 181,
    INVOKEVIRTUAL = 182, INVOKESPECIAL = 183, INVOKESTATIC = 184, INVOKEINTERFACE = 185,
    INVOKEDYNAMIC = 186, NEW = 187, NEWARRAY = 188, ANEWARRAY = 189, ARRAYLENGTH = 190,
    ATHROW = 191, CHECKCAST = 192, INSTANCEOF = 193, MONITORENTER = 194, MONITOREXIT = 195,
    MULTIANEWARRAY = 197, IFNULL = 198, IFNONNULL = 199,
    LABEL = 300, FRAME_NEW = 301, FRAME_FULL = 302, FRAME_APPEND = 303, FRAME_CHOP = 304,
    FRAME_SAME = 305, FRAME_SAME1 = 306,
}

static BY_NAME: Lazy<HashMap<&'static str, Opcode>> =
    Lazy::new(|| TABLE.iter().map(|&(name, code)| (name, code)).collect());

static BY_CODE: Lazy<HashMap<Opcode, &'static str>> =
    Lazy::new(|| TABLE.iter().map(|&(name, code)| (code, name)).collect());

impl Opcode {
    /// Look an opcode up by its upper-case mnemonic
    pub fn from_mnemonic(name: &str) -> Option<Opcode> {
        BY_NAME.get(name.to_ascii_uppercase().as_str()).copied()
    }

    pub fn mnemonic(self) -> &'static str {
        BY_CODE.get(&self).copied().unwrap_or("UNKNOWN")
    }

    pub fn is_known(self) -> bool {
        BY_CODE.contains_key(&self)
    }

    pub fn is_return(self) -> bool {
        (Self::IRETURN.0..=Self::RETURN.0).contains(&self.0)
    }

    /// Single-operand comparisons against zero or null
    pub fn is_unary_jump(self) -> bool {
        (Self::IFEQ.0..=Self::IFLE.0).contains(&self.0) || self == Self::IFNULL || self == Self::IFNONNULL
    }

    /// Two-operand comparisons
    pub fn is_binary_jump(self) -> bool {
        (Self::IF_ICMPEQ.0..=Self::IF_ACMPNE.0).contains(&self.0)
    }

    pub fn is_conditional_jump(self) -> bool {
        self.is_unary_jump() || self.is_binary_jump()
    }

    pub fn is_jump(self) -> bool {
        self.is_conditional_jump() || self == Self::GOTO
    }

    pub fn is_invoke(self) -> bool {
        (Self::INVOKEVIRTUAL.0..=Self::INVOKEDYNAMIC.0).contains(&self.0)
    }

    pub fn is_load(self) -> bool {
        (Self::ILOAD.0..=Self::ALOAD.0).contains(&self.0)
    }

    pub fn is_store(self) -> bool {
        (Self::ISTORE.0..=Self::ASTORE.0).contains(&self.0)
    }

    pub fn is_array_load(self) -> bool {
        (Self::IALOAD.0..=Self::SALOAD.0).contains(&self.0)
    }

    pub fn is_array_store(self) -> bool {
        (Self::IASTORE.0..=Self::SASTORE.0).contains(&self.0)
    }

    pub fn is_frame(self) -> bool {
        (Self::FRAME_NEW.0..=Self::FRAME_SAME1.0).contains(&self.0)
    }
}

impl fmt::Display for Opcode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match BY_CODE.get(self) {
            Some(name) => f.write_str(name),
            None => write!(f, "OP_{}", self.0),
        }
    }
}

impl TryFrom<String> for Opcode {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Opcode::from_mnemonic(&value).ok_or_else(|| format!("unknown opcode mnemonic `{}`", value))
    }
}

impl From<Opcode> for String {
    fn from(value: Opcode) -> Self {
        value.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mnemonics_resolve_both_ways() {
        assert_eq!(Opcode::from_mnemonic("iadd"), Some(Opcode::IADD));
        assert_eq!(Opcode::IF_ICMPLE.mnemonic(), "IF_ICMPLE");
        assert_eq!(Opcode(250).to_string(), "OP_250");
        assert!(Opcode::from_mnemonic("FOO").is_none());
    }

    #[test]
    fn classification_ranges() {
        assert!(Opcode::IFNULL.is_conditional_jump());
        assert!(Opcode::GOTO.is_jump());
        assert!(!Opcode::GOTO.is_conditional_jump());
        assert!(Opcode::LRETURN.is_return());
        assert!(Opcode::FRAME_SAME1.is_frame());
        assert!(Opcode::CALOAD.is_array_load());
    }

    #[test]
    fn serde_uses_mnemonics() {
        let json = serde_json::to_string(&Opcode::DUP_X1).unwrap();
        assert_eq!(json, "\"DUP_X1\"");
        let back: Opcode = serde_json::from_str("\"istore\"").unwrap();
        assert_eq!(back, Opcode::ISTORE);
    }
}
