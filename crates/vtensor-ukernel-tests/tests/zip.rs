use vtensor_ukernel_tests::define_zip_tests;
use vtensor_ukernels::zip;

define_zip_tests!(
    scalar,
    x2: zip::x2_scalar,
    x3: zip::x3_scalar,
    x4: zip::x4_scalar,
    xm: zip::xm_scalar,
    threshold: 1,
);

define_zip_tests!(
    optimized,
    x2: zip::x2,
    x3: zip::x3,
    x4: zip::x4,
    xm: zip::xm,
    threshold: zip::BLOCK,
);
